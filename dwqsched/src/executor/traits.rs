use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dwqcore::work::{Work, WorkDetached};

#[async_trait]
pub trait Executor {
    type Error;

    /// Drive one attempt of a claimed record to its terminal write.
    /// Returns the updated record, or None when the record was moved
    /// away from RUNNING underneath the attempt.
    async fn execute(
        &self,
        work: WorkDetached,
        cancel: CancellationToken,
    ) -> Result<Option<Work>, Self::Error>;
}
