use std::fmt;

use crate::{
    error::BackendError,
    platform::WSPlatform,
    work::{
        Work,
        WorkRef,
    },
};

/// A claimed record detached from its platform so it can cross the
/// dispatch channel; the executor re-binds it before running.
pub struct WorkDetached {
    pub(super) inner: Work,
    pub(super) url: String,
}

impl<'a> WorkRef<'a> {
    pub fn detach(self) -> WorkDetached {
        WorkDetached {
            url: self.platform.url().to_string(),
            inner: self.inner,
        }
    }
}

impl WorkDetached {
    pub fn bind<'a, P: WSPlatform + Sized>(
        self,
        platform: &'a P,
    ) -> Result<WorkRef<'a>, BackendError> {
        if self.url == platform.url() {
            Ok(WorkRef {
                inner: self.inner,
                platform: platform.as_dyn(),
            })
        } else {
            Err(BackendError::NonMatchingBind)
        }
    }

    pub fn id(&self) -> i64 {
        self.inner.id
    }

    pub fn class_key(&self) -> &str {
        &self.inner.class_key
    }
}

impl fmt::Display for WorkDetached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}
