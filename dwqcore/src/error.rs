use thiserror::Error;

pub mod work;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    #[cfg(feature = "sqlx")]
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    /// Denotes custom application invariant; generally informative.
    #[error("application invariant violated: {0}")]
    AppInvariantViolation(String),
    #[error("record bound against a non-matching platform")]
    NonMatchingBind,
    #[error("unknown error")]
    Unknown,
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ValueError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("uninitialized value")]
    Uninitialized,
    #[error("uninitialized attribute: {0}")]
    UninitializedAttribute(&'static str),
}
