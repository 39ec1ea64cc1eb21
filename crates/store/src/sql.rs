use async_trait::async_trait;
use issuebot_core::config::DatabaseConfig;
use issuebot_core::{IssueIndex, Resolution, ShortCode};
use sqlx::Row;
use tracing::debug;

use crate::connection::{connect_with_settings, DbPool};
use crate::{BackendKind, IssueStore, StoreError};

/// Point lookups against a local SQLite table with `code`, `description` and
/// `response` columns.
#[derive(Clone)]
pub struct SqlIssueStore {
    pool: DbPool,
    table: String,
}

impl SqlIssueStore {
    pub fn new(pool: DbPool, table: impl Into<String>) -> Result<Self, StoreError> {
        let table = table.into();
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::Configuration(format!(
                "database.table `{table}` is not a plain identifier"
            )));
        }
        Ok(Self { pool, table })
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool =
            connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await?;
        Self::new(pool, config.table.clone())
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl IssueStore for SqlIssueStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sql
    }

    async fn fetch_all(&self) -> Result<IssueIndex, StoreError> {
        Err(StoreError::Unsupported { backend: BackendKind::Sql, operation: "fetch_all" })
    }

    async fn fetch_one(&self, code: &ShortCode) -> Result<Resolution, StoreError> {
        let sql = format!("SELECT response FROM {} WHERE code = ?1 LIMIT 1", self.table);
        let row = sqlx::query(&sql).bind(code.raw()).fetch_optional(&self.pool).await?;
        let text = match row {
            Some(row) => row.try_get::<Option<String>, _>("response")?,
            None => None,
        };

        debug!(
            event_name = "store.sql.lookup_completed",
            table = %self.table,
            code = %code.raw(),
            found = text.is_some(),
            "issue lookup finished"
        );
        Ok(text.into())
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let sql = format!("SELECT 1 FROM {} LIMIT 1", self.table);
        sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(())
    }
}
