use async_trait::async_trait;

use crate::{
    error::BackendError,
    platform::PlatformUrl,
    work::{
        traits::WorkBackend,
        WorkRef,
    },
};

/// WSPlatform - Work Scheduling Platform
///
/// The storage surface the scheduler runtime drives: everything that
/// correctly implements the backing store composes into this trait.
#[async_trait]
pub trait WSPlatform: WorkBackend
    + PlatformUrl

    + Send
    + Sync
{
    fn as_dyn(&self) -> &dyn WSPlatform;

    /// Claim an eligible record for execution, returning it bound to
    /// this platform.
    async fn claim(
        &self,
        id: i64,
    ) -> Result<Option<WorkRef<'_>>, BackendError> {
        Ok(WorkBackend::claim_work(self, id)
            .await?
            .map(|work| work.bind(self.as_dyn()))
        )
    }
}

pub trait DefaultWSPlatform: WSPlatform {}

impl<P: WorkBackend
    + PlatformUrl

    + DefaultWSPlatform

    + Send
    + Sync
> WSPlatform for P {
    fn as_dyn(&self) -> &dyn WSPlatform {
        self
    }
}
