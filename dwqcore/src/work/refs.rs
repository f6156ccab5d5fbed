use crate::{
    error::BackendError,
    input::Data,
    platform::WSPlatform,
    work::{
        traits::WorkBackend,
        Transition,
        Work,
    },
};

/// A record bound to the platform it came from; the executor drives an
/// attempt to completion through this.
pub struct WorkRef<'a> {
    pub(super) inner: Work,
    pub(super) platform: &'a dyn WSPlatform,
}

impl Work {
    pub(crate) fn bind(self, platform: &dyn WSPlatform) -> WorkRef<'_> {
        WorkRef {
            inner: self,
            platform,
        }
    }
}

impl<'a> WorkRef<'a> {
    pub fn id(&self) -> i64 {
        self.inner.id
    }

    pub fn class_key(&self) -> &str {
        &self.inner.class_key
    }

    pub fn input(&self) -> &Data {
        &self.inner.input
    }

    pub fn work(&self) -> &Work {
        &self.inner
    }

    /// Write the planned transition through the store. Returns the
    /// updated record, or None when the record was moved away from
    /// RUNNING underneath the attempt.
    pub async fn finish(
        &mut self,
        transition: &Transition,
    ) -> Result<Option<Work>, BackendError> {
        let result = WorkBackend::apply_transition(
            self.platform,
            self.inner.id,
            transition,
        ).await?;
        if let Some(updated) = result.as_ref() {
            self.inner = updated.clone();
        }
        Ok(result)
    }

    pub fn into_inner(self) -> Work {
        self.inner
    }
}
