use async_trait::async_trait;
use dwqcore::platform::{ConnectorOption, PlatformConnector, PlatformUrl};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::SqliteBackend;

impl PlatformUrl for SqliteBackend {
    fn url(&self) -> &str {
        self.url.as_ref()
    }
}

impl SqliteBackend {
    pub async fn connect(opts: ConnectorOption) -> Result<SqliteBackend, sqlx::Error> {
        if opts.auto_create_db && !Sqlite::database_exists(&opts.url).await.unwrap_or(false) {
            log::warn!("sqlite database {} does not exist; creating...", &opts.url);
            Sqlite::create_database(&opts.url).await?
        }

        let pool = SqlitePool::connect(&opts.url).await?;
        Ok(SqliteBackend {
            pool: Arc::new(pool),
            url: opts.url,
        })
    }

    pub async fn migrate_ws(self) -> Result<Self, sqlx::Error> {
        sqlx::migrate!("migrations/dwq").run(&*self.pool).await?;
        Ok(self)
    }
}

#[async_trait]
impl PlatformConnector for SqliteBackend {
    async fn ws(
        opts: ConnectorOption,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let backend = SqliteBackend::connect(opts).await
            .map_err(Box::new)?
            .migrate_ws()
            .await
            .map_err(Box::new)?;
        Ok(backend)
    }
}

mod work;

mod default_impl {
    use dwqcore::platform::DefaultWSPlatform;
    use crate::SqliteBackend;

    impl DefaultWSPlatform for SqliteBackend {}
}

// For testing unified usage/traits
#[cfg(test)]
pub(crate) mod tests {
    use dwqcore::platform::{PlatformConnector, WSPlatform};
    use dwqcore::work::{NewWork, IngestOutcome, WorkRequest, traits::WorkBackend};
    use crate::SqliteBackend;

    #[tokio::test]
    async fn connect_migrate_claim() -> anyhow::Result<()> {
        let backend = SqliteBackend::ws("sqlite::memory:".into())
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        let outcome = WorkBackend::insert_work(&backend, NewWork {
            request: WorkRequest::one_shot("refresh"),
            unique_name: None,
            policy: None,
        }).await?;
        let work = match outcome {
            IngestOutcome::Created { work, .. } => work,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let claimed = backend.claim(work.id)
            .await?
            .expect("work is due");
        assert_eq!(claimed.id(), work.id);
        assert_eq!(claimed.class_key(), "refresh");
        Ok(())
    }
}
