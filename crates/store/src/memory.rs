use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use issuebot_core::{IssueIndex, IssueRow, Resolution, ShortCode};
use tokio::sync::RwLock;

use crate::{index_rows, BackendKind, IssueStore, StoreError};

/// Tabular store over rows held in memory. Every fetch builds a fresh index,
/// the same as the spreadsheet backend.
#[derive(Default)]
pub struct MemoryIssueStore {
    rows: RwLock<Vec<IssueRow>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryIssueStore {
    pub fn with_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = IssueRow>,
    {
        Self { rows: RwLock::new(rows.into_iter().collect()), ..Self::default() }
    }

    pub async fn replace_rows(&self, rows: Vec<IssueRow>) {
        *self.rows.write().await = rows;
    }

    /// While set, every call fails like a backend that answered without data.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::missing_data(BackendKind::Memory, "no data in memory store"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IssueStore for MemoryIssueStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn fetch_all(&self) -> Result<IssueIndex, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let rows = self.rows.read().await.clone();
        Ok(index_rows(BackendKind::Memory, rows))
    }

    async fn fetch_one(&self, code: &ShortCode) -> Result<Resolution, StoreError> {
        Ok(self.fetch_all().await?.lookup(code))
    }

    async fn probe(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
