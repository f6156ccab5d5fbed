use std::sync::Arc;
use tokio::{
    runtime,
    signal,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use dwqcore::{
    constraint::Signals,
    error::{
        work::{ValidationError, WorkError},
        BackendError,
    },
    platform::WSPlatform,
    work::{
        IngestOutcome,
        NewWork,
        UniquePolicy,
        Work,
        WorkFilter,
        WorkKind,
        WorkRequest,
        WorkSnapshot,
    },
};

use crate::{
    config::SchedulerConfig,
    executor::RegistryExecutor,
    handle::{ForegroundNotifier, LogForegroundNotifier},
    ingest,
    monitor::{SignalMonitor, SignalSource},
    observe::ObserveHub,
    registry::WorkerRegistry,
    runner::Runner,
};

use super::*;

impl<P> Default for Builder<P>
where
    for<'a> P: WSPlatform + 'a,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Builder<P>
where
    for<'a> P: WSPlatform + 'a,
{
    pub fn new() -> Self {
        Self {
            platform: None,
            registry: WorkerRegistry::new(),
            config: SchedulerConfig::default(),
            foreground: Arc::new(LogForegroundNotifier),
            initial_signals: Signals::default(),
        }
    }

    pub fn platform(mut self, platform: P) -> Self {
        self.platform = Some(Arc::new(platform));
        self
    }

    pub fn registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn foreground(mut self, notifier: impl ForegroundNotifier + 'static) -> Self {
        self.foreground = Arc::new(notifier);
        self
    }

    pub fn signals(mut self, signals: Signals) -> Self {
        self.initial_signals = signals;
        self
    }

    pub fn build(self) -> Scheduler<P> {
        Scheduler {
            platform: self.platform
                .expect("platform was not provided with Builder"),
            registry: Arc::new(self.registry),
            hub: Arc::new(ObserveHub::new()),
            config: Arc::new(self.config),
            foreground: self.foreground,
            initial_signals: self.initial_signals,
            runner_handle: None,
            signal_source: None,
        }
    }
}

impl<P> Scheduler<P>
where
    for<'a> P: WSPlatform + 'a,
{
    /// Spawn the monitor and runner onto the current runtime; calling
    /// again is a no-op.
    pub async fn startup(&mut self) {
        if self.runner_handle.is_some() {
            return; // don't start again
        }
        let (monitor, source) = SignalMonitor::new(self.initial_signals);
        let signals = monitor.subscribe();
        tokio::spawn(monitor.run());

        let executor = RegistryExecutor::new(
            Arc::clone(&self.platform),
            Arc::clone(&self.registry),
            Arc::clone(&self.hub),
            Arc::clone(&self.config),
            Arc::clone(&self.foreground),
        );
        let mut runner = Runner::new(
            Arc::clone(&self.platform),
            executor,
            Arc::clone(&self.hub),
            Arc::clone(&self.config),
            runtime::Handle::current(),
            signals,
        );
        let handle = runner.handle();
        tokio::spawn(async move {
            runner.run().await
        });
        self.runner_handle = Some(handle);
        self.signal_source = Some(source);
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Take the handle the host uses to report device signals; None
    /// before startup or once taken.
    pub fn signal_source(&mut self) -> Option<SignalSource> {
        self.signal_source.take()
    }

    pub async fn enqueue(&self, request: WorkRequest) -> Result<i64, WorkError> {
        ingest::validate(&request, &self.config)?;
        let outcome = self.platform.insert_work(NewWork {
            request,
            unique_name: None,
            policy: None,
        }).await?;
        Ok(self.absorb(outcome).await)
    }

    pub async fn enqueue_unique(
        &self,
        name: impl Into<String>,
        policy: UniquePolicy,
        request: WorkRequest,
    ) -> Result<i64, WorkError> {
        ingest::validate(&request, &self.config)?;
        if request.kind == WorkKind::Periodic
            && matches!(policy, UniquePolicy::Append | UniquePolicy::AppendOrReplace)
        {
            return Err(ValidationError::PeriodicInChain.into());
        }
        let outcome = self.platform.insert_work(NewWork {
            request,
            unique_name: Some(name.into()),
            policy: Some(policy),
        }).await?;
        Ok(self.absorb(outcome).await)
    }

    async fn absorb(&self, outcome: IngestOutcome) -> i64 {
        match outcome {
            IngestOutcome::Created { work, displaced } => {
                for old in displaced.iter() {
                    self.hub.publish_work(old);
                }
                self.hub.publish_work(&work);
                if let Some(handle) = self.runner_handle.as_ref() {
                    handle.notify_cancelled(
                        displaced.iter().map(|w| w.id).collect()
                    ).await;
                    handle.wake().await;
                }
                work.id
            }
            IngestOutcome::Existing(id) => id,
        }
    }

    async fn after_cancel(&self, changed: &[Work]) -> Vec<i64> {
        let ids: Vec<i64> = changed.iter().map(|w| w.id).collect();
        for work in changed.iter() {
            self.hub.publish_work(work);
        }
        if let Some(handle) = self.runner_handle.as_ref() {
            handle.notify_cancelled(ids.clone()).await;
            handle.wake().await;
        }
        ids
    }

    /// Cancel a record and its dependents. Idempotent; returns the ids
    /// whose state changed.
    pub async fn cancel_by_id(&self, id: i64) -> Result<Vec<i64>, BackendError> {
        let changed = self.platform.cancel_cascade(id).await?;
        Ok(self.after_cancel(&changed).await)
    }

    pub async fn cancel_by_tag(&self, tag: &str) -> Result<Vec<i64>, BackendError> {
        let mut changed = Vec::new();
        for work in self.platform.list_by_tag(tag).await? {
            if work.state.is_terminal() {
                continue;
            }
            changed.extend(self.platform.cancel_cascade(work.id).await?);
        }
        Ok(self.after_cancel(&changed).await)
    }

    pub async fn cancel_unique(&self, name: &str) -> Result<Vec<i64>, BackendError> {
        let mut changed = Vec::new();
        for work in self.platform.list_by_unique_name(name).await? {
            if work.state.is_terminal() {
                continue;
            }
            changed.extend(self.platform.cancel_cascade(work.id).await?);
        }
        Ok(self.after_cancel(&changed).await)
    }

    fn snapshots(&self, works: Vec<Work>) -> Vec<WorkSnapshot> {
        works.iter()
            .map(|work| {
                let mut snapshot = work.snapshot();
                self.hub.decorate(&mut snapshot);
                snapshot
            })
            .collect()
    }

    pub async fn get_info_by_id(
        &self,
        id: i64,
    ) -> Result<Option<WorkSnapshot>, BackendError> {
        Ok(self.platform.get_work(id)
            .await?
            .map(|work| {
                let mut snapshot = work.snapshot();
                self.hub.decorate(&mut snapshot);
                snapshot
            })
        )
    }

    pub async fn get_infos_by_tag(
        &self,
        tag: &str,
    ) -> Result<Vec<WorkSnapshot>, BackendError> {
        Ok(self.snapshots(self.platform.list_by_tag(tag).await?))
    }

    pub async fn get_infos_by_unique_name(
        &self,
        name: &str,
    ) -> Result<Vec<WorkSnapshot>, BackendError> {
        Ok(self.snapshots(self.platform.list_by_unique_name(name).await?))
    }

    pub async fn query(
        &self,
        filter: &WorkFilter,
    ) -> Result<Vec<WorkSnapshot>, BackendError> {
        Ok(self.snapshots(self.platform.query_works(filter).await?))
    }

    /// Open a change-stream: the matching snapshots as of now, then a
    /// snapshot per relevant state or progress change.
    pub async fn observe(
        &self,
        filter: WorkFilter,
    ) -> Result<UnboundedReceiverStream<WorkSnapshot>, BackendError> {
        let initial = self.platform.query_works(&filter).await?;
        Ok(self.hub.subscribe(
            filter,
            initial.iter().map(|work| work.snapshot()),
        ))
    }

    /// Graceful shutdown: stop accepting dispatches and wait for
    /// running attempts to finish.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.runner_handle.take() {
            handle.shutdown().await;
        }
    }

    /// Block until ctrl-c, then shut down; a second ctrl-c during the
    /// wind-down stops further dispatching.
    pub async fn wait_for_shutdown_signal(&mut self) {
        log::trace!("waiting for shutdown signal");
        match signal::ctrl_c().await {
            Ok(()) => {
                log::debug!("Ctrl-C received for shutdown");
                if let Some(handle) = self.runner_handle.as_ref() {
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        if signal::ctrl_c().await.is_ok() {
                            log::debug!("Ctrl-C received for terminate");
                            handle.terminate();
                        }
                    });
                }
                self.shutdown().await;
            }
            Err(err) => {
                log::debug!("Unable to listen for shutdown signal: {}", err);
                log::debug!("shutdown not signaled");
            }
        }
    }
}
