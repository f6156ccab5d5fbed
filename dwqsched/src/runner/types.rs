use std::collections::HashMap;
use std::sync::{
    atomic::AtomicBool,
    Arc,
};
use tokio::{
    runtime,
    sync::{
        mpsc,
        watch,
        Semaphore,
    },
};
use tokio_util::{
    sync::CancellationToken,
    task::TaskTracker,
};

use dwqcore::{
    constraint::Signals,
    work::Work,
};

use crate::{
    config::SchedulerConfig,
    observe::ObserveHub,
};

pub enum RunnerMessage {
    /// Re-evaluate eligibility (ingest notifications and the like).
    Wake,
    /// Records the store already cancelled; raise their tokens.
    Cancelled(Vec<i64>),
    /// An executor finished an attempt; the updated record if the
    /// transition landed.
    Completed(i64, Option<Work>),
    Shutdown,
}

pub struct Runner<P, EX> {
    pub(super) platform: Arc<P>,
    pub(super) executor: EX,
    pub(super) hub: Arc<ObserveHub>,
    pub(super) config: Arc<SchedulerConfig>,
    pub(super) rt_handle: runtime::Handle,
    pub(super) sender: mpsc::Sender<RunnerMessage>,
    pub(super) receiver: mpsc::Receiver<RunnerMessage>,
    pub(super) semaphore: Arc<Semaphore>,
    pub(super) task_tracker: TaskTracker,
    pub(super) termination_token: Arc<AtomicBool>,
    pub(super) signals: watch::Receiver<Signals>,
    pub(super) signals_live: bool,
    /// Tokens of leased records, keyed by id; exactly one per RUNNING
    /// record.
    pub(super) running: HashMap<i64, CancellationToken>,
    pub(super) next_wake_ts: Option<i64>,
    pub(super) last_prune_ts: i64,
}

#[derive(Clone)]
pub struct RunnerHandle {
    pub(super) sender: mpsc::Sender<RunnerMessage>,
    pub(super) task_tracker: TaskTracker,
    pub(super) termination_token: Arc<AtomicBool>,
}
