use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    task::JoinError,
    time,
};
use tokio_util::sync::CancellationToken;

use dwqcore::{
    platform::WSPlatform,
    work::{
        Disposition,
        Work,
        WorkDetached,
    },
};

use crate::{
    config::SchedulerConfig,
    error::RunnerError,
    handle::{ForegroundNotifier, WorkHandle},
    observe::ObserveHub,
    registry::{WorkOutcome, WorkerRegistry},
};

use super::*;

fn panic_message(error: JoinError) -> Option<String> {
    match error.try_into_panic() {
        Ok(payload) => Some(
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "body panicked".to_string()
            }
        ),
        // the only other join failure is an abort
        Err(_) => None,
    }
}

impl<P> RegistryExecutor<P>
where
    for<'a> P: WSPlatform + 'a,
{
    pub fn new(
        platform: Arc<P>,
        registry: Arc<WorkerRegistry>,
        hub: Arc<ObserveHub>,
        config: Arc<SchedulerConfig>,
        foreground: Arc<dyn ForegroundNotifier>,
    ) -> Self {
        Self {
            platform,
            registry,
            hub,
            config,
            foreground,
        }
    }

    /// Run the registered body for this record, pumping its progress
    /// and foreground publications, and reduce whatever happened to a
    /// disposition.
    async fn run_body(
        &self,
        work: &Work,
        cancel: CancellationToken,
    ) -> Disposition {
        let Some(mut worker) = self.registry.build(&work.class_key) else {
            log::error!("{work} names an unregistered class key");
            return Disposition::MissingWorker;
        };

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let (foreground_tx, mut foreground_rx) = mpsc::unbounded_channel();
        let handle = WorkHandle::new(
            work.id,
            cancel.clone(),
            progress_tx,
            foreground_tx,
        );
        let input = work.input.clone();
        let mut body = tokio::spawn(async move {
            worker.run(input, handle).await
        });

        let disposition = loop {
            tokio::select! {
                result = &mut body => break match result {
                    Ok(WorkOutcome::Success(data)) => Disposition::Success(data),
                    Ok(WorkOutcome::Retry) => Disposition::Retry,
                    Ok(WorkOutcome::Failure(data)) => Disposition::Failure(data),
                    Err(error) => match panic_message(error) {
                        Some(message) => {
                            log::warn!("{work} body panicked: {message}");
                            Disposition::Panicked(message)
                        }
                        None => Disposition::Cancelled,
                    },
                },
                Some(data) = progress_rx.recv() => {
                    self.hub.publish_progress(work, data);
                }
                Some(spec) = foreground_rx.recv() => {
                    log::debug!("{work} marked long-running");
                    self.foreground.notify(work.id, &spec);
                }
                _ = cancel.cancelled() => {
                    log::debug!(
                        "{work} cancelled; allowing {:?} to wind down",
                        self.config.quiescence_deadline,
                    );
                    if time::timeout(self.config.quiescence_deadline, &mut body)
                        .await
                        .is_err()
                    {
                        log::warn!("{work} missed the quiescence deadline; reclaiming slot");
                        body.abort();
                        let _ = (&mut body).await;
                    }
                    break Disposition::Cancelled;
                }
            }
        };

        // deliver progress that raced the completion; post-cancel
        // progress is discarded
        if !matches!(disposition, Disposition::Cancelled) {
            while let Ok(data) = progress_rx.try_recv() {
                self.hub.publish_progress(work, data);
            }
        }
        disposition
    }
}

#[async_trait]
impl<P> Executor for RegistryExecutor<P>
where
    for<'a> P: WSPlatform + 'a,
{
    type Error = RunnerError;

    async fn execute(
        &self,
        work: WorkDetached,
        cancel: CancellationToken,
    ) -> Result<Option<Work>, Self::Error> {
        let mut work_ref = work.bind(self.platform.as_ref())?;
        log::debug!("executor starting attempt for {}", work_ref.work());
        let disposition = self.run_body(work_ref.work(), cancel).await;
        let transition = work_ref.work().plan_transition(
            disposition,
            Utc::now().timestamp_millis(),
            self.config.panic_is_retry,
        );
        Ok(work_ref.finish(&transition).await?)
    }
}
