use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        atomic::Ordering,
        Arc,
    },
    time::Duration,
};
use tokio::{
    runtime,
    sync::{
        mpsc,
        watch,
        Semaphore,
    },
    time::{
        self,
        Instant,
    },
};
use tokio_util::{
    sync::CancellationToken,
    task::TaskTracker,
};

use dwqcore::{
    constraint::Signals,
    platform::WSPlatform,
    work::Work,
};

use crate::{
    config::SchedulerConfig,
    error::RunnerError,
    executor::Executor,
    observe::ObserveHub,
};

use super::*;

/// Fallback wake interval; drives the retention sweep and catches
/// anything a missed notification would otherwise strand.
const IDLE_TICK: Duration = Duration::from_secs(30);

/// Minimum spacing between retention sweeps.
const PRUNE_INTERVAL_MS: i64 = 60 * 1000;

enum Step {
    Message(Option<RunnerMessage>),
    Signals(bool),
    Timer,
}

impl<P, EX> Runner<P, EX>
where
    for<'a> P: WSPlatform + 'a,
    for<'a> EX: Executor + Send + Sync + Clone + 'a,
    <EX as Executor>::Error: Send + std::fmt::Display + std::fmt::Debug,
{
    pub fn new(
        platform: Arc<P>,
        executor: EX,
        hub: Arc<ObserveHub>,
        config: Arc<SchedulerConfig>,
        rt_handle: runtime::Handle,
        signals: watch::Receiver<Signals>,
    ) -> Self {
        let permits = config.parallelism_cap.max(1);
        log::info!("setting up runner with {permits} permits");
        let semaphore = Arc::new(Semaphore::new(permits));
        let task_tracker = TaskTracker::new();
        let (sender, receiver) = mpsc::channel((permits * 2).max(8));
        let termination_token = Arc::new(false.into());
        Self {
            platform,
            executor,
            hub,
            config,
            rt_handle,
            sender,
            receiver,
            semaphore,
            task_tracker,
            termination_token,
            signals,
            signals_live: true,
            running: HashMap::new(),
            next_wake_ts: None,
            last_prune_ts: 0,
        }
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            sender: self.sender.clone(),
            task_tracker: self.task_tracker.clone(),
            termination_token: self.termination_token.clone(),
        }
    }

    /// Run the scheduler loop: recover interrupted work, then react to
    /// control messages, signal transitions and timer fires until
    /// shutdown drains the queue.
    pub async fn run(&mut self) {
        log::debug!("runner starting up");
        match self.platform.recover_interrupted().await {
            Ok(recovered) => {
                for work in recovered.iter() {
                    log::info!(
                        "recovered interrupted {work}; re-enqueued at attempt {}",
                        work.attempt,
                    );
                    self.hub.publish_work(work);
                }
            }
            Err(e) => log::error!("failed to recover interrupted work: {e}"),
        }
        self.pass().await;
        loop {
            let deadline = self.next_deadline();
            let step = tokio::select! {
                msg = self.receiver.recv() => Step::Message(msg),
                result = self.signals.changed(), if self.signals_live => {
                    Step::Signals(result.is_ok())
                }
                _ = time::sleep_until(deadline) => Step::Timer,
            };
            match step {
                Step::Message(None) => break,
                Step::Message(Some(RunnerMessage::Shutdown)) => {
                    self.receiver.close();
                    self.task_tracker.close();
                    log::debug!("runner shutdown signal received");
                }
                Step::Message(Some(RunnerMessage::Wake)) => self.pass().await,
                Step::Message(Some(RunnerMessage::Cancelled(ids))) => {
                    self.cancel_running(&ids);
                    self.pass().await;
                }
                Step::Message(Some(RunnerMessage::Completed(id, updated))) => {
                    self.complete(id, updated);
                    self.pass().await;
                }
                Step::Signals(true) => self.pass().await,
                Step::Signals(false) => {
                    log::debug!("signal monitor gone; constraint wakes disabled");
                    self.signals_live = false;
                }
                Step::Timer => self.pass().await,
            }
        }
        log::debug!("runner shutting down");
    }

    /// One full evaluation: resolve blocked chains, dispatch whatever
    /// is eligible, sweep retention, and re-arm the timer.
    async fn pass(&mut self) {
        if self.termination_token.load(Ordering::Relaxed) {
            return;
        }
        let now_ts = Utc::now().timestamp_millis();
        if let Err(e) = self.resolve_blocked().await {
            log::error!("blocked resolution failed: {e}");
        }
        if let Err(e) = self.dispatch(now_ts).await {
            log::error!("dispatch failed: {e}");
        }
        self.prune(now_ts).await;
        self.next_wake_ts = match self.platform.next_wake_ts().await {
            Ok(ts) => ts,
            Err(e) => {
                log::error!("failed to read next wake: {e}");
                None
            }
        };
    }

    /// BLOCKED records whose prerequisites all terminated either
    /// activate with their merged input or cascade to CANCELLED.
    async fn resolve_blocked(&mut self) -> Result<(), RunnerError> {
        for work in self.platform.list_blocked().await? {
            let states = self.platform.prereq_states(work.id).await?;
            if states.iter().any(|(_, state)| {
                state.is_terminal() && *state != dwqcore::work::WorkState::Succeeded
            }) {
                for cancelled in self.platform.cancel_cascade(work.id).await? {
                    log::debug!("{cancelled} cancelled by failed prerequisite");
                    self.hub.publish_work(&cancelled);
                }
            } else if states.iter().all(|(_, state)| {
                *state == dwqcore::work::WorkState::Succeeded
            }) {
                let outputs = self.platform.prereq_outputs(work.id).await?;
                let merged = work.input_merger.merge(work.input.clone(), outputs);
                if let Some(promoted) =
                    self.platform.promote_blocked(work.id, &merged).await?
                {
                    log::debug!("{promoted} activated; prerequisites satisfied");
                    self.hub.publish_work(&promoted);
                }
            }
        }
        Ok(())
    }

    /// Claim and hand out due, constraint-satisfied records until the
    /// permits run dry.
    async fn dispatch(&mut self, now_ts: i64) -> Result<(), RunnerError> {
        let signals = *self.signals.borrow_and_update();
        for due in self.platform.list_due(now_ts).await? {
            if !due.constraints.satisfied(&signals) {
                continue;
            }
            if self.running.contains_key(&due.id) {
                continue;
            }
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                break;
            };
            let Some(work_ref) = self.platform.claim(due.id).await? else {
                continue;
            };
            self.hub.publish_work(work_ref.work());
            log::debug!("dispatching {}", work_ref.work());
            let detached = work_ref.detach();
            let token = CancellationToken::new();
            self.running.insert(due.id, token.clone());
            let executor = self.executor.clone();
            let sender = self.sender.clone();
            self.rt_handle.spawn(self.task_tracker.track_future(async move {
                let id = detached.id();
                let updated = match executor.execute(detached, token).await {
                    Ok(updated) => updated,
                    Err(e) => {
                        log::error!("work executor error: {e}");
                        None
                    }
                };
                // free the slot before the completion lands so the
                // follow-up dispatch sees it
                drop(permit);
                if sender.send(RunnerMessage::Completed(id, updated)).await.is_err() {
                    log::debug!("runner no longer listening for completion of work {id}");
                }
            }));
        }
        Ok(())
    }

    fn cancel_running(&mut self, ids: &[i64]) {
        for id in ids {
            if let Some(token) = self.running.get(id) {
                log::debug!("raising cancellation for running work {id}");
                token.cancel();
            }
        }
    }

    fn complete(&mut self, id: i64, updated: Option<Work>) {
        self.running.remove(&id);
        match updated {
            Some(work) => {
                log::debug!("{work} finished attempt in state {:?}", work.state);
                self.hub.publish_work(&work);
            }
            // the record moved under the attempt (e.g. cancelled); the
            // cancelling path already published it
            None => log::debug!("work {id} finished without a transition"),
        }
    }

    async fn prune(&mut self, now_ts: i64) {
        if now_ts - self.last_prune_ts < PRUNE_INTERVAL_MS {
            return;
        }
        self.last_prune_ts = now_ts;
        let cutoff_ts = now_ts - self.config.retention_after_terminal_ms;
        match self.platform.prune_terminal(cutoff_ts).await {
            Ok(0) => (),
            Ok(pruned) => log::info!("retention sweep removed {pruned} records"),
            Err(e) => log::error!("retention sweep failed: {e}"),
        }
    }

    fn next_deadline(&self) -> Instant {
        let mut wait = IDLE_TICK;
        if let Some(ts) = self.next_wake_ts {
            let now_ts = Utc::now().timestamp_millis();
            if ts > now_ts {
                wait = wait.min(Duration::from_millis((ts - now_ts) as u64));
            }
        }
        Instant::now() + wait
    }
}

impl RunnerHandle {
    /// Nudge the runner to re-evaluate eligibility.
    pub async fn wake(&self) {
        match self.sender.send(RunnerMessage::Wake).await {
            Ok(()) => (),
            Err(_) => log::debug!("failed to wake runner as it is no longer listening"),
        }
    }

    /// Tell the runner these records were cancelled in the store so
    /// running attempts observe it.
    pub async fn notify_cancelled(&self, ids: Vec<i64>) {
        if ids.is_empty() {
            return;
        }
        match self.sender.send(RunnerMessage::Cancelled(ids)).await {
            Ok(()) => (),
            Err(_) => log::debug!("failed to notify runner of cancellations"),
        }
    }

    pub async fn shutdown(&self) {
        match self.sender.send(RunnerMessage::Shutdown).await {
            Ok(()) => (),
            Err(_) => {
                log::debug!("failed to send shutdown signal to runner as it's no longer listening.");
                self.task_tracker.close();
            }
        }
        log::debug!("waiting for task_tracker...");
        self.task_tracker.wait().await;
        log::debug!("finished waiting for task_tracker");
    }

    pub fn terminate(&self) {
        self.termination_token.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
