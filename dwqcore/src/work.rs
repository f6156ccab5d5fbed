use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    constraint::Constraints,
    input::Data,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Deserialize, Serialize)]
#[repr(i64)]
pub enum WorkKind {
    #[default]
    OneShot = 0,
    Periodic = 1,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Deserialize, Serialize)]
#[repr(i64)]
pub enum WorkState {
    #[default]
    Enqueued = 0,
    Blocked = 1,
    Running = 2,
    Succeeded = 3,
    Failed = 4,
    Cancelled = 5,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Deserialize, Serialize)]
#[repr(i64)]
pub enum BackoffPolicy {
    #[default]
    Exponential = 0,
    Linear = 1,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Deserialize, Serialize)]
#[repr(i64)]
pub enum InputMerger {
    #[default]
    Overwrite = 0,
    ArrayCollecting = 1,
}

/// Resolution rule applied when a new request names a `unique_name`
/// already held by a live record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniquePolicy {
    Replace,
    Keep,
    Append,
    AppendOrReplace,
}

/// The durable unit of the store. Timestamps and durations are unix
/// milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Work {
    pub id: i64,
    pub kind: WorkKind,
    pub class_key: String,
    pub input: Data,
    pub constraints: Constraints,
    pub initial_delay_ms: i64,
    pub period_ms: Option<i64>,
    pub flex_ms: Option<i64>,
    pub backoff_policy: BackoffPolicy,
    pub backoff_base_ms: i64,
    pub backoff_cap_ms: i64,
    pub tags: Vec<String>,
    pub unique_name: Option<String>,
    pub prereqs: Vec<i64>,
    pub input_merger: InputMerger,
    pub state: WorkState,
    pub attempt: i64,
    pub run_count: i64,
    pub period_anchor_ts: Option<i64>,
    pub next_run_ts: i64,
    pub output: Option<Data>,
    pub created_ts: i64,
    pub last_run_ts: Option<i64>,
    pub completed_ts: Option<i64>,
}

/// What the host submits; everything else on [`Work`] is assigned at
/// ingest.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WorkRequest {
    pub kind: WorkKind,
    pub class_key: String,
    pub input: Data,
    pub constraints: Constraints,
    pub initial_delay_ms: i64,
    pub period_ms: Option<i64>,
    pub flex_ms: Option<i64>,
    pub backoff_policy: BackoffPolicy,
    pub backoff_base_ms: i64,
    pub backoff_cap_ms: i64,
    pub tags: Vec<String>,
    pub prereqs: Vec<i64>,
    pub input_merger: InputMerger,
}

/// A request packaged for the store together with the uniqueness
/// resolution to apply inside the insert transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct NewWork {
    pub request: WorkRequest,
    pub unique_name: Option<String>,
    pub policy: Option<UniquePolicy>,
}

/// Result of a transactional insert.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestOutcome {
    Created {
        work: Work,
        /// Records cancelled by a REPLACE resolution, dependents
        /// included.
        displaced: Vec<Work>,
    },
    /// A KEEP resolution saw a live record; its id is returned and the
    /// store is unchanged.
    Existing(i64),
}

/// Terminal report from one execution attempt of a body.
#[derive(Clone, Debug, PartialEq)]
pub enum Disposition {
    Success(Data),
    Retry,
    Failure(Data),
    Cancelled,
    Panicked(String),
    MissingWorker,
}

/// The state change the scheduler computed for a finished attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    Succeed { output: Data },
    Fail { output: Data },
    Retry { next_run_ts: i64 },
    NextPeriod { anchor_ts: i64, next_run_ts: i64 },
    Cancel,
}

/// Point-in-time view of a record as exposed to observers.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkSnapshot {
    pub id: i64,
    pub state: WorkState,
    pub attempt: i64,
    pub run_count: i64,
    pub tags: Vec<String>,
    pub unique_name: Option<String>,
    pub progress: Option<Data>,
    pub output: Option<Data>,
}

/// Composable any-of filter over ids, tags, unique names and states.
/// An empty group matches everything.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkFilter {
    pub ids: Vec<i64>,
    pub tags: Vec<String>,
    pub unique_names: Vec<String>,
    pub states: Vec<WorkState>,
}

mod impls;
pub mod traits;
mod refs;
pub use refs::WorkRef;
mod detached;
pub use detached::WorkDetached;
