use std::sync::Arc;

use crate::{
    config::SchedulerConfig,
    handle::ForegroundNotifier,
    observe::ObserveHub,
    registry::WorkerRegistry,
};

/// Executor backed by the host's worker registry; the body runs on the
/// worker pool and its outcome is written back through the platform.
pub struct RegistryExecutor<P> {
    pub(crate) platform: Arc<P>,
    pub(crate) registry: Arc<WorkerRegistry>,
    pub(crate) hub: Arc<ObserveHub>,
    pub(crate) config: Arc<SchedulerConfig>,
    pub(crate) foreground: Arc<dyn ForegroundNotifier>,
}

impl<P> Clone for RegistryExecutor<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            registry: Arc::clone(&self.registry),
            hub: Arc::clone(&self.hub),
            config: Arc::clone(&self.config),
            foreground: Arc::clone(&self.foreground),
        }
    }
}
