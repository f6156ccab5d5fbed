use std::sync::Arc;

use dwqcore::constraint::Signals;

use crate::{
    config::SchedulerConfig,
    handle::ForegroundNotifier,
    monitor::SignalSource,
    observe::ObserveHub,
    registry::WorkerRegistry,
    runner::RunnerHandle,
};

pub struct Builder<P> {
    pub(super) platform: Option<Arc<P>>,
    pub(super) registry: WorkerRegistry,
    pub(super) config: SchedulerConfig,
    pub(super) foreground: Arc<dyn ForegroundNotifier>,
    pub(super) initial_signals: Signals,
}

/// The host-facing scheduler: ingestion, cancellation, queries,
/// observation, and lifecycle of the runner and monitor it drives.
pub struct Scheduler<P> {
    pub(super) platform: Arc<P>,
    pub(super) registry: Arc<WorkerRegistry>,
    pub(super) hub: Arc<ObserveHub>,
    pub(super) config: Arc<SchedulerConfig>,
    pub(super) foreground: Arc<dyn ForegroundNotifier>,
    pub(super) initial_signals: Signals,
    pub(super) runner_handle: Option<RunnerHandle>,
    pub(super) signal_source: Option<SignalSource>,
}
