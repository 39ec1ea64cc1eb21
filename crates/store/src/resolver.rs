use std::sync::Arc;

use issuebot_core::{Resolution, ShortCode};
use tracing::debug;

use crate::{BackendKind, IssueStore, StoreError};

/// Maps trigger text to a canned response through whichever store is
/// configured. Holds no state between calls.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn IssueStore>,
}

impl Resolver {
    pub fn new(store: Arc<dyn IssueStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> BackendKind {
        self.store.backend()
    }

    pub async fn resolve(&self, trigger_text: &str) -> Result<Resolution, StoreError> {
        let code = ShortCode::new(trigger_text);
        if code.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let resolution = self.store.fetch_one(&code).await?;
        debug!(
            event_name = "store.resolve.completed",
            backend = %self.store.backend(),
            code = %code.normalized(),
            found = resolution.is_found(),
            "resolved trigger text"
        );
        Ok(resolution)
    }

    /// The synthesized `list` text. Only tabular backends can enumerate.
    pub async fn list(&self) -> Result<String, StoreError> {
        let index = self.store.fetch_all().await?;
        Ok(index.listing().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use issuebot_core::domain::issue::LIST_HEADER;
    use issuebot_core::{IssueRow, Resolution};

    use super::Resolver;
    use crate::connection::connect_with_settings;
    use crate::{MemoryIssueStore, SqlIssueStore, StoreError};

    fn greeting_resolver() -> (Arc<MemoryIssueStore>, Resolver) {
        let rows = vec![IssueRow::new("hi", "greeting", "Hello there")];
        let store = Arc::new(MemoryIssueStore::with_rows(rows));
        (store.clone(), Resolver::new(store))
    }

    #[tokio::test]
    async fn resolves_case_insensitively() {
        let (_, resolver) = greeting_resolver();
        let found = resolver.resolve("HI").await.expect("resolve");
        let missing = resolver.resolve("bye").await.expect("resolve");

        assert_eq!(found, Resolution::Found("Hello there".into()));
        assert_eq!(missing, Resolution::NotFound);
    }

    #[tokio::test]
    async fn list_resolves_to_listing() {
        let (_, resolver) = greeting_resolver();
        let resolution = resolver.resolve(" List ").await.expect("resolve");
        let listing = resolution.into_option().expect("list entry");

        assert!(listing.contains(LIST_HEADER));
        assert!(listing.contains("`hi` = greeting"));
        assert_eq!(resolver.list().await.expect("listing"), listing);
    }

    #[tokio::test]
    async fn blank_trigger_skips_the_backend() {
        let (store, resolver) = greeting_resolver();
        assert_eq!(resolver.resolve("  \t ").await.expect("resolve"), Resolution::NotFound);
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let (store, resolver) = greeting_resolver();
        store.set_unavailable(true);

        let error = resolver.resolve("hi").await.expect_err("unavailable");
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn listing_from_query_backend_is_unsupported() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        let store = SqlIssueStore::new(pool, "issues").expect("store");
        let resolver = Resolver::new(Arc::new(store));

        let error = resolver.list().await.expect_err("unsupported");
        assert!(matches!(error, StoreError::Unsupported { .. }));
    }
}
