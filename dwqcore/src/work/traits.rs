use async_trait::async_trait;

use crate::{
    error::{
        work::WorkError,
        BackendError,
    },
    input::Data,
    work::{
        IngestOutcome,
        NewWork,
        Transition,
        Work,
        WorkFilter,
        WorkState,
    },
};

/// The persistent store under the scheduler. State transitions are
/// atomic and serializable; everything a dispatch decision needs comes
/// out of these calls.
#[async_trait]
pub trait WorkBackend {
    /// Insert a request, resolving the uniqueness policy within the
    /// same transaction.
    async fn insert_work(
        &self,
        new_work: NewWork,
    ) -> Result<IngestOutcome, WorkError>;

    async fn get_work(
        &self,
        id: i64,
    ) -> Result<Option<Work>, BackendError>;

    async fn list_by_tag(
        &self,
        tag: &str,
    ) -> Result<Vec<Work>, BackendError>;

    async fn list_by_unique_name(
        &self,
        name: &str,
    ) -> Result<Vec<Work>, BackendError>;

    async fn query_works(
        &self,
        filter: &WorkFilter,
    ) -> Result<Vec<Work>, BackendError>;

    /// ENQUEUED records with `next_run_ts <= now_ts`, ordered by
    /// (next_run_ts, attempt, created_ts, id).
    async fn list_due(
        &self,
        now_ts: i64,
    ) -> Result<Vec<Work>, BackendError>;

    async fn list_blocked(
        &self,
    ) -> Result<Vec<Work>, BackendError>;

    /// Atomically move an ENQUEUED record to RUNNING, incrementing its
    /// attempt and stamping `last_run_ts`. Returns None when the record
    /// was concurrently moved away from ENQUEUED.
    async fn claim_work(
        &self,
        id: i64,
    ) -> Result<Option<Work>, BackendError>;

    /// Apply a planned transition to a RUNNING record. Returns the
    /// updated record, or None when the record is no longer RUNNING
    /// (e.g. cancelled while the attempt wound down).
    async fn apply_transition(
        &self,
        id: i64,
        transition: &Transition,
    ) -> Result<Option<Work>, BackendError>;

    /// Activate a BLOCKED record whose prerequisites all succeeded,
    /// replacing its input with the merged payload.
    async fn promote_blocked(
        &self,
        id: i64,
        input: &Data,
    ) -> Result<Option<Work>, BackendError>;

    /// Cancel a record and every transitive dependent that is not
    /// already terminal. Returns the records that changed state.
    async fn cancel_cascade(
        &self,
        id: i64,
    ) -> Result<Vec<Work>, BackendError>;

    /// States of the record's prerequisites, in prerequisite
    /// enumeration order.
    async fn prereq_states(
        &self,
        id: i64,
    ) -> Result<Vec<(i64, WorkState)>, BackendError>;

    /// Outputs of the record's prerequisites, in prerequisite
    /// enumeration order; prerequisites without an output contribute an
    /// empty payload.
    async fn prereq_outputs(
        &self,
        id: i64,
    ) -> Result<Vec<Data>, BackendError>;

    /// Demote RUNNING records left over from a previous process to
    /// ENQUEUED. The attempt they were claimed with is retained, which
    /// leaves each interrupted record exactly one attempt ahead of its
    /// pre-run value.
    async fn recover_interrupted(
        &self,
    ) -> Result<Vec<Work>, BackendError>;

    /// Earliest `next_run_ts` among ENQUEUED records, for timer arming.
    async fn next_wake_ts(
        &self,
    ) -> Result<Option<i64>, BackendError>;

    /// Delete terminal records whose completion predates `cutoff_ts`.
    async fn prune_terminal(
        &self,
        cutoff_ts: i64,
    ) -> Result<u64, BackendError>;
}
