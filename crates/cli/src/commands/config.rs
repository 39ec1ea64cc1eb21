use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use issuebot_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILES};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let webhook_url = redact_url(config.slack.webhook_url.expose_secret());
    let access_token = match config.store.access_token.as_ref() {
        Some(token) if !token.expose_secret().trim().is_empty() => "<redacted>",
        Some(_) => "<empty>",
        None => "<unset>",
    };

    let fields: &[(&str, String, &[&str])] = &[
        ("slack.app_id", config.slack.app_id.clone(), &["ISSUEBOT_SLACK_APP_ID"]),
        ("slack.webhook_url", webhook_url, &["ISSUEBOT_SLACK_WEBHOOK_URL"]),
        ("store.backend", config.store.backend.as_str().to_string(), &["ISSUEBOT_STORE_BACKEND"]),
        ("store.access_token", access_token.to_string(), &["ISSUEBOT_STORE_ACCESS_TOKEN"]),
        (
            "store.timeout_secs",
            config.store.timeout_secs.to_string(),
            &["ISSUEBOT_STORE_TIMEOUT_SECS"],
        ),
        (
            "sheets.spreadsheet_id",
            config.sheets.spreadsheet_id.clone(),
            &["ISSUEBOT_SHEETS_SPREADSHEET_ID"],
        ),
        ("sheets.range", config.sheets.range.clone(), &["ISSUEBOT_SHEETS_RANGE"]),
        (
            "sheets.api_base_url",
            config.sheets.api_base_url.clone(),
            &["ISSUEBOT_SHEETS_API_BASE_URL"],
        ),
        (
            "bigquery.project_id",
            config.bigquery.project_id.clone(),
            &["ISSUEBOT_BIGQUERY_PROJECT_ID"],
        ),
        ("bigquery.dataset", config.bigquery.dataset.clone(), &["ISSUEBOT_BIGQUERY_DATASET"]),
        ("bigquery.table", config.bigquery.table.clone(), &["ISSUEBOT_BIGQUERY_TABLE"]),
        (
            "bigquery.api_base_url",
            config.bigquery.api_base_url.clone(),
            &["ISSUEBOT_BIGQUERY_API_BASE_URL"],
        ),
        ("database.url", config.database.url.clone(), &["ISSUEBOT_DATABASE_URL"]),
        ("database.table", config.database.table.clone(), &["ISSUEBOT_DATABASE_TABLE"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["ISSUEBOT_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["ISSUEBOT_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["ISSUEBOT_SERVER_BIND_ADDRESS"],
        ),
        ("server.port", config.server.port.to_string(), &["ISSUEBOT_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["ISSUEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["ISSUEBOT_LOGGING_LEVEL", "ISSUEBOT_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ISSUEBOT_LOGGING_FORMAT", "ISSUEBOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps scheme and host; the path of an incoming webhook is the credential.
fn redact_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split('/').next().unwrap_or_default();
            format!("{scheme}://{host}/***")
        }
        None => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact_url;

    #[test]
    fn webhook_path_is_redacted() {
        assert_eq!(
            redact_url("https://hooks.slack.com/services/T000/B000/XXXX"),
            "https://hooks.slack.com/***"
        );
        assert_eq!(redact_url(""), "<empty>");
        assert_eq!(redact_url("not-a-url"), "<redacted>");
    }
}
