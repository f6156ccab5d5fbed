use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Backend(#[from] dwqcore::error::BackendError),
    #[error(transparent)]
    Work(#[from] dwqcore::error::work::WorkError),
    #[error(transparent)]
    Value(#[from] dwqcore::error::ValueError),
}
