use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dwqcore::input::Data;

/// What the host surfaces when a body promotes itself to a
/// long-running foreground task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForegroundSpec {
    pub title: String,
    pub text: String,
}

/// Host hook receiving foreground promotions; rendering the
/// notification is the host's concern.
pub trait ForegroundNotifier: Send + Sync {
    fn notify(&self, work_id: i64, spec: &ForegroundSpec);
}

/// Default notifier; promotions only reach the log.
pub struct LogForegroundNotifier;

impl ForegroundNotifier for LogForegroundNotifier {
    fn notify(&self, work_id: i64, spec: &ForegroundSpec) {
        log::info!("work {work_id} promoted to foreground: {}", spec.title);
    }
}

/// Per-execution handle passed to a body; the only channel between a
/// running body and the engine.
#[derive(Clone)]
pub struct WorkHandle {
    work_id: i64,
    cancel: CancellationToken,
    progress: mpsc::UnboundedSender<Data>,
    foreground: mpsc::UnboundedSender<ForegroundSpec>,
}

impl WorkHandle {
    pub(crate) fn new(
        work_id: i64,
        cancel: CancellationToken,
        progress: mpsc::UnboundedSender<Data>,
        foreground: mpsc::UnboundedSender<ForegroundSpec>,
    ) -> Self {
        Self {
            work_id,
            cancel,
            progress,
            foreground,
        }
    }

    pub fn work_id(&self) -> i64 {
        self.work_id
    }

    /// Bodies must poll this cooperatively; after the quiescence
    /// deadline the slot is reclaimed regardless.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the record is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Publish a progress payload; best-effort and coalesced keep-last
    /// on the observation surface.
    pub fn publish_progress(&self, data: Data) {
        if self.progress.send(data).is_err() {
            log::debug!("progress for work {} dropped; attempt wound down", self.work_id);
        }
    }

    /// Mark this execution long-running and hand the host a
    /// notification spec to surface.
    pub fn promote_to_foreground(&self, spec: ForegroundSpec) {
        if self.foreground.send(spec).is_err() {
            log::debug!("foreground promotion for work {} dropped", self.work_id);
        }
    }
}
