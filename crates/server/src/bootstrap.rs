use std::sync::Arc;

use issuebot_core::config::{AppConfig, ConfigError, LoadOptions};
use issuebot_slack::{DispatchCoordinator, EventClassifier, IncomingWebhookClient, WebhookError};
use issuebot_store::{connect_store, IssueStore, Resolver, StoreError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn IssueStore>,
    pub coordinator: Arc<DispatchCoordinator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("issue store setup failed: {0}")]
    Store(#[from] StoreError),
    #[error("webhook client setup failed: {0}")]
    Webhook(#[from] WebhookError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        backend = config.store.backend.as_str(),
        "starting application bootstrap"
    );

    let store = connect_store(&config).await?;
    info!(
        event_name = "system.bootstrap.store_ready",
        correlation_id = "bootstrap",
        backend = %store.backend(),
        "issue store initialized"
    );

    let webhook = Arc::new(IncomingWebhookClient::from_config(&config)?);
    let coordinator = Arc::new(DispatchCoordinator::new(
        EventClassifier::new(config.slack.app_id.clone()),
        Resolver::new(store.clone()),
        webhook,
    ));

    Ok(Application { config, store, coordinator })
}

#[cfg(test)]
mod tests {
    use issuebot_core::config::{ConfigOverrides, LoadOptions, StoreBackend};

    use crate::bootstrap::bootstrap;

    fn overrides() -> ConfigOverrides {
        ConfigOverrides {
            slack_app_id: Some("A0TEST".to_string()),
            slack_webhook_url: Some("https://hooks.slack.test/services/T/B/X".to_string()),
            store_backend: Some(StoreBackend::Sql),
            database_url: Some("sqlite::memory:".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_app_id() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides { slack_app_id: Some(" ".to_string()), ..overrides() },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_id"));
    }

    #[tokio::test]
    async fn bootstrap_wires_sql_backend() {
        let app = bootstrap(LoadOptions { overrides: overrides(), ..LoadOptions::default() })
            .await
            .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.store.backend().as_str(), "sql");
        assert_eq!(app.coordinator.resolver().backend().as_str(), "sql");
        assert_eq!(app.config.slack.app_id, "A0TEST");
    }
}
