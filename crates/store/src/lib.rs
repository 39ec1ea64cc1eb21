//! Issue store adapters.
//!
//! Every backend implements [`IssueStore`], which exposes two capabilities:
//! - `fetch_all` builds a full [`IssueIndex`] snapshot (tabular backends)
//! - `fetch_one` resolves a single [`ShortCode`] (every backend)
//!
//! ```text
//! Resolver → IssueStore ─┬─ SheetsIssueStore   (range read, snapshot)
//!                        ├─ BigQueryIssueStore (parameterized point query)
//!                        ├─ SqlIssueStore      (parameterized point query)
//!                        └─ MemoryIssueStore   (snapshot, tests)
//! ```
//!
//! Nothing is cached between calls: each resolution fetches its own snapshot.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use issuebot_core::config::{AppConfig, StoreBackend};
use issuebot_core::domain::issue::RejectedRow;
use issuebot_core::errors::BACKEND_UNAVAILABLE_STATUS;
use issuebot_core::{ApplicationError, IssueIndex, IssueRow, Resolution, ShortCode};
use thiserror::Error;
use tracing::warn;

pub mod bigquery;
pub mod connection;
mod http;
pub mod memory;
pub mod resolver;
pub mod sheets;
pub mod sql;

pub use bigquery::BigQueryIssueStore;
pub use connection::{connect_with_settings, DbPool};
pub use memory::MemoryIssueStore;
pub use resolver::Resolver;
pub use sheets::SheetsIssueStore;
pub use sql::SqlIssueStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Sheets,
    BigQuery,
    Sql,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sheets => "sheets",
            Self::BigQuery => "bigquery",
            Self::Sql => "sql",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{backend} backend unavailable (status {status}): {detail}")]
    BackendUnavailable { backend: BackendKind, status: u16, detail: String },
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{backend} backend does not support {operation}")]
    Unsupported { backend: BackendKind, operation: &'static str },
    #[error("store configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    pub(crate) fn missing_data(backend: BackendKind, detail: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            status: BACKEND_UNAVAILABLE_STATUS,
            detail: detail.into(),
        }
    }

    /// Failures a redelivered event could plausibly get past.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. } | Self::Request(_) | Self::Database(_))
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::BackendUnavailable { status, .. } => {
                Self::BackendUnavailable { status, message: value.to_string() }
            }
            StoreError::Request(ref error) => Self::BackendUnavailable {
                status: error.status().map(|status| status.as_u16()).unwrap_or(502),
                message: value.to_string(),
            },
            StoreError::Database(_) => Self::BackendUnavailable {
                status: BACKEND_UNAVAILABLE_STATUS,
                message: value.to_string(),
            },
            StoreError::Decode(_) => Self::Integration(value.to_string()),
            StoreError::Unsupported { .. } => Self::Unsupported(value.to_string()),
            StoreError::Configuration(message) => Self::Configuration(message),
        }
    }
}

#[async_trait]
pub trait IssueStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Full snapshot including the synthesized `list` entry.
    async fn fetch_all(&self) -> Result<IssueIndex, StoreError>;

    async fn fetch_one(&self, code: &ShortCode) -> Result<Resolution, StoreError>;

    /// Cheap reachability check used by health and doctor reporting.
    async fn probe(&self) -> Result<(), StoreError>;
}

pub async fn connect_store(config: &AppConfig) -> Result<Arc<dyn IssueStore>, StoreError> {
    let store: Arc<dyn IssueStore> = match config.store.backend {
        StoreBackend::Sheets => Arc::new(SheetsIssueStore::from_config(config)?),
        StoreBackend::BigQuery => Arc::new(BigQueryIssueStore::from_config(config)?),
        StoreBackend::Sql => Arc::new(SqlIssueStore::connect(&config.database).await?),
    };
    Ok(store)
}

/// Builds an index from backend rows and reports rows that were dropped.
pub(crate) fn index_rows(backend: BackendKind, rows: Vec<IssueRow>) -> IssueIndex {
    let index = IssueIndex::from_rows(rows);
    for rejected in index.rejected() {
        let (reason, code) = match rejected {
            RejectedRow::ReservedCode { code } => ("reserved_code", code),
            RejectedRow::EmptyCode { code } => ("empty_code", code),
        };
        warn!(
            event_name = "store.index.row_rejected",
            backend = %backend,
            reason,
            code = %code,
            "backend row rejected while building issue index"
        );
    }
    index
}

#[cfg(test)]
mod tests {
    use issuebot_core::errors::BACKEND_UNAVAILABLE_STATUS;
    use issuebot_core::ApplicationError;

    use super::{BackendKind, StoreError};

    #[test]
    fn missing_data_is_retryable_backend_unavailable() {
        let error = StoreError::missing_data(BackendKind::Sheets, "response had no values");
        assert!(error.is_retryable());

        let mapped = ApplicationError::from(error);
        assert!(matches!(
            mapped,
            ApplicationError::BackendUnavailable { status, ref message }
                if status == BACKEND_UNAVAILABLE_STATUS && message.contains("no values")
        ));
    }

    #[test]
    fn unsupported_enumeration_maps_to_unsupported() {
        let error =
            StoreError::Unsupported { backend: BackendKind::BigQuery, operation: "fetch_all" };
        assert!(!error.is_retryable());
        assert!(matches!(ApplicationError::from(error), ApplicationError::Unsupported(_)));
    }

    #[test]
    fn decode_failure_is_integration_error() {
        let mapped = ApplicationError::from(StoreError::Decode("bad json".to_owned()));
        assert!(matches!(
            mapped,
            ApplicationError::Integration(ref message) if message.contains("bad json")
        ));
    }
}
