use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use dwqcore::{
    input::Data,
    work::{Work, WorkFilter, WorkSnapshot, WorkState},
};

/// Fan-out point for snapshot change-streams.
///
/// Progress is runtime-transient: the hub keeps the latest payload per
/// record (keep-last coalescing) and folds it into every snapshot it
/// hands out. Consumers own filtering and teardown; a dropped stream
/// unsubscribes on the next delivery.
#[derive(Default)]
pub struct ObserveHub {
    inner: Mutex<HubInner>,
}

#[derive(Default)]
struct HubInner {
    progress: HashMap<i64, Data>,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    filter: WorkFilter,
    tx: mpsc::UnboundedSender<WorkSnapshot>,
}

fn deliver(inner: &mut HubInner, snapshot: &WorkSnapshot) {
    inner.subscribers.retain(|subscriber| {
        if subscriber.filter.matches_parts(
            snapshot.id,
            snapshot.state,
            &snapshot.tags,
            snapshot.unique_name.as_deref(),
        ) {
            subscriber.tx.send(snapshot.clone()).is_ok()
        } else {
            !subscriber.tx.is_closed()
        }
    });
}

impl ObserveHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a state change for a record.
    pub fn publish_work(&self, work: &Work) {
        let mut inner = self.inner.lock()
            .expect("observe hub lock poisoned");
        if work.state.is_terminal() {
            inner.progress.remove(&work.id);
        }
        let mut snapshot = work.snapshot();
        snapshot.progress = inner.progress.get(&work.id).cloned();
        deliver(&mut inner, &snapshot);
    }

    /// Publish a progress payload for a running record.
    pub fn publish_progress(&self, work: &Work, data: Data) {
        let mut inner = self.inner.lock()
            .expect("observe hub lock poisoned");
        inner.progress.insert(work.id, data.clone());
        let mut snapshot = work.snapshot();
        snapshot.state = WorkState::Running;
        snapshot.progress = Some(data);
        deliver(&mut inner, &snapshot);
    }

    /// Latest progress payload for a record, if any.
    pub fn progress_of(&self, id: i64) -> Option<Data> {
        self.inner.lock()
            .expect("observe hub lock poisoned")
            .progress
            .get(&id)
            .cloned()
    }

    /// Fold the latest progress into a queried snapshot.
    pub fn decorate(&self, snapshot: &mut WorkSnapshot) {
        snapshot.progress = self.progress_of(snapshot.id);
    }

    /// Register a change-stream: the initial snapshots first, then one
    /// snapshot per relevant state or progress change, in per-record
    /// order.
    pub fn subscribe(
        &self,
        filter: WorkFilter,
        initial: impl IntoIterator<Item = WorkSnapshot>,
    ) -> UnboundedReceiverStream<WorkSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock()
            .expect("observe hub lock poisoned");
        for mut snapshot in initial {
            snapshot.progress = inner.progress.get(&snapshot.id).cloned();
            if tx.send(snapshot).is_err() {
                break;
            }
        }
        inner.subscribers.push(Subscriber { filter, tx });
        UnboundedReceiverStream::new(rx)
    }
}
