use async_trait::async_trait;
use std::error::Error;

mod work_scheduling;
pub use work_scheduling::{DefaultWSPlatform, WSPlatform};

pub trait PlatformUrl {
    fn url(&self) -> &str;
}

/// Options for establishing a connection to a platform backend.
#[derive(Clone, Debug)]
pub struct ConnectorOption {
    pub url: String,
    pub auto_create_db: bool,
}

impl From<&str> for ConnectorOption {
    fn from(url: &str) -> Self {
        Self {
            url: url.to_string(),
            auto_create_db: true,
        }
    }
}

impl From<String> for ConnectorOption {
    fn from(url: String) -> Self {
        Self {
            url,
            auto_create_db: true,
        }
    }
}

#[async_trait]
pub trait PlatformConnector: Sized {
    async fn ws(
        opts: ConnectorOption,
    ) -> Result<Self, Box<dyn Error + Send + Sync + 'static>>;
}
