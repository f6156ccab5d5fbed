use thiserror::Error;

use crate::input::MAX_DATA_SIZE;

/// Rejections produced while validating a request at ingest.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("input of {0} bytes exceeds the {MAX_DATA_SIZE} byte limit")]
    InputTooLarge(usize),
    #[error("input cannot be serialized: {0}")]
    InvalidInput(serde_json::Error),
    #[error("backoff base delay of {got} ms is below the {floor} ms floor")]
    BackoffTooShort { floor: i64, got: i64 },
    #[error("period of {got} ms is below the {minimum} ms minimum")]
    PeriodTooShort { minimum: i64, got: i64 },
    #[error("flex of {flex} ms exceeds the period of {period} ms")]
    FlexExceedsPeriod { period: i64, flex: i64 },
    #[error("periodic work requires a period")]
    PeriodMissing,
    #[error("periodic work requires a flex interval")]
    FlexMissing,
    #[error("initial delay cannot be negative")]
    NegativeDelay,
    #[error("one-shot work cannot carry a period")]
    StrayPeriod,
    #[error("periodic work cannot carry an initial delay")]
    StrayInitialDelay,
    #[error("periodic work cannot join a chain")]
    PeriodicInChain,
    #[error("tags must be non-empty strings")]
    EmptyTag,
    #[error("invalid prerequisite work id: {0}")]
    InvalidPrereq(i64),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WorkError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no worker registered for class key: {0}")]
    UnknownClassKey(String),
    #[error("unknown prerequisite work id: {0}")]
    UnknownPrereq(i64),
    #[error("work cannot list itself as a prerequisite: {0}")]
    SelfReference(i64),
    #[error(transparent)]
    Backend(#[from] crate::error::BackendError),
}
