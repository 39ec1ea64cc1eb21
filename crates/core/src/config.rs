use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub store: StoreConfig,
    pub sheets: SheetsConfig,
    pub bigquery: BigQueryConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    /// Expected `api_app_id` on every inbound event.
    pub app_id: String,
    pub webhook_url: SecretString,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub table: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Sheets,
    #[serde(rename = "bigquery")]
    BigQuery,
    Sql,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sheets => "sheets",
            Self::BigQuery => "bigquery",
            Self::Sql => "sql",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_app_id: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub store_backend: Option<StoreBackend>,
    pub access_token: Option<String>,
    pub sheets_spreadsheet_id: Option<String>,
    pub sheets_api_base_url: Option<String>,
    pub bigquery_api_base_url: Option<String>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["issuebot.toml", "config/issuebot.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig { app_id: String::new(), webhook_url: String::new().into() },
            store: StoreConfig {
                backend: StoreBackend::Sheets,
                access_token: None,
                timeout_secs: 10,
            },
            sheets: SheetsConfig {
                spreadsheet_id: String::new(),
                range: "A2:C".to_string(),
                api_base_url: "https://sheets.googleapis.com".to_string(),
            },
            bigquery: BigQueryConfig {
                project_id: String::new(),
                dataset: String::new(),
                table: String::new(),
                api_base_url: "https://bigquery.googleapis.com".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://issuebot.db".to_string(),
                table: "issues".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sheets" => Ok(Self::Sheets),
            "bigquery" => Ok(Self::BigQuery),
            "sql" => Ok(Self::Sql),
            other => Err(ConfigError::Validation(format!(
                "unsupported store backend `{other}` (expected sheets|bigquery|sql)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(app_id) = slack.app_id {
                self.slack.app_id = app_id;
            }
            if let Some(webhook_url) = slack.webhook_url {
                self.slack.webhook_url = secret_value(webhook_url);
            }
        }

        if let Some(store) = patch.store {
            if let Some(backend) = store.backend {
                self.store.backend = backend;
            }
            if let Some(access_token) = store.access_token {
                self.store.access_token = Some(secret_value(access_token));
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(sheets) = patch.sheets {
            if let Some(spreadsheet_id) = sheets.spreadsheet_id {
                self.sheets.spreadsheet_id = spreadsheet_id;
            }
            if let Some(range) = sheets.range {
                self.sheets.range = range;
            }
            if let Some(api_base_url) = sheets.api_base_url {
                self.sheets.api_base_url = api_base_url;
            }
        }

        if let Some(bigquery) = patch.bigquery {
            if let Some(project_id) = bigquery.project_id {
                self.bigquery.project_id = project_id;
            }
            if let Some(dataset) = bigquery.dataset {
                self.bigquery.dataset = dataset;
            }
            if let Some(table) = bigquery.table {
                self.bigquery.table = table;
            }
            if let Some(api_base_url) = bigquery.api_base_url {
                self.bigquery.api_base_url = api_base_url;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(table) = database.table {
                self.database.table = table;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ISSUEBOT_SLACK_APP_ID") {
            self.slack.app_id = value;
        }
        if let Some(value) = read_env("ISSUEBOT_SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = secret_value(value);
        }

        if let Some(value) = read_env("ISSUEBOT_STORE_BACKEND") {
            self.store.backend = value.parse()?;
        }
        if let Some(value) = read_env("ISSUEBOT_STORE_ACCESS_TOKEN") {
            self.store.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("ISSUEBOT_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("ISSUEBOT_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ISSUEBOT_SHEETS_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = value;
        }
        if let Some(value) = read_env("ISSUEBOT_SHEETS_RANGE") {
            self.sheets.range = value;
        }
        if let Some(value) = read_env("ISSUEBOT_SHEETS_API_BASE_URL") {
            self.sheets.api_base_url = value;
        }

        if let Some(value) = read_env("ISSUEBOT_BIGQUERY_PROJECT_ID") {
            self.bigquery.project_id = value;
        }
        if let Some(value) = read_env("ISSUEBOT_BIGQUERY_DATASET") {
            self.bigquery.dataset = value;
        }
        if let Some(value) = read_env("ISSUEBOT_BIGQUERY_TABLE") {
            self.bigquery.table = value;
        }
        if let Some(value) = read_env("ISSUEBOT_BIGQUERY_API_BASE_URL") {
            self.bigquery.api_base_url = value;
        }

        if let Some(value) = read_env("ISSUEBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ISSUEBOT_DATABASE_TABLE") {
            self.database.table = value;
        }
        if let Some(value) = read_env("ISSUEBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("ISSUEBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ISSUEBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ISSUEBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ISSUEBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ISSUEBOT_SERVER_PORT") {
            self.server.port = parse_u16("ISSUEBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ISSUEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ISSUEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("ISSUEBOT_LOGGING_LEVEL").or_else(|| read_env("ISSUEBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ISSUEBOT_LOGGING_FORMAT").or_else(|| read_env("ISSUEBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(app_id) = overrides.slack_app_id {
            self.slack.app_id = app_id;
        }
        if let Some(webhook_url) = overrides.slack_webhook_url {
            self.slack.webhook_url = secret_value(webhook_url);
        }
        if let Some(backend) = overrides.store_backend {
            self.store.backend = backend;
        }
        if let Some(access_token) = overrides.access_token {
            self.store.access_token = Some(secret_value(access_token));
        }
        if let Some(spreadsheet_id) = overrides.sheets_spreadsheet_id {
            self.sheets.spreadsheet_id = spreadsheet_id;
        }
        if let Some(api_base_url) = overrides.sheets_api_base_url {
            self.sheets.api_base_url = api_base_url;
        }
        if let Some(api_base_url) = overrides.bigquery_api_base_url {
            self.bigquery.api_base_url = api_base_url;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_store(self)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if slack.app_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_id is required. Find it at https://api.slack.com/apps > Your App > Basic Information > App ID".to_string(),
        ));
    }

    let webhook_url = slack.webhook_url.expose_secret();
    if webhook_url.is_empty() {
        return Err(ConfigError::Validation(
            "slack.webhook_url is required. Create one at https://api.slack.com/apps > Your App > Incoming Webhooks".to_string(),
        ));
    }
    if !is_http_url(webhook_url) {
        return Err(ConfigError::Validation(
            "slack.webhook_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_store(config: &AppConfig) -> Result<(), ConfigError> {
    let store = &config.store;
    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match store.backend {
        StoreBackend::Sheets => {
            require_access_token(store)?;
            let sheets = &config.sheets;
            if sheets.spreadsheet_id.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "sheets.spreadsheet_id is required for the sheets backend".to_string(),
                ));
            }
            if sheets.range.trim().is_empty() {
                return Err(ConfigError::Validation("sheets.range must not be empty".to_string()));
            }
            if !is_http_url(&sheets.api_base_url) {
                return Err(ConfigError::Validation(
                    "sheets.api_base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        StoreBackend::BigQuery => {
            require_access_token(store)?;
            let bigquery = &config.bigquery;
            for (key, value) in [
                ("bigquery.project_id", &bigquery.project_id),
                ("bigquery.dataset", &bigquery.dataset),
                ("bigquery.table", &bigquery.table),
            ] {
                if !is_table_identifier(value, &['-']) {
                    return Err(ConfigError::Validation(format!(
                        "{key} is required for the bigquery backend and may only contain letters, digits, `_` or `-`"
                    )));
                }
            }
            if !is_http_url(&bigquery.api_base_url) {
                return Err(ConfigError::Validation(
                    "bigquery.api_base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        StoreBackend::Sql => validate_database(&config.database)?,
    }

    Ok(())
}

fn require_access_token(store: &StoreConfig) -> Result<(), ConfigError> {
    let missing = store
        .access_token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation(format!(
            "store.access_token is required for the {} backend",
            store.backend.as_str()
        )));
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if !is_table_identifier(&database.table, &[]) {
        return Err(ConfigError::Validation(
            "database.table may only contain letters, digits or `_`".to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Table and dataset names are spliced into query text, so only plain
/// identifier characters are allowed.
fn is_table_identifier(value: &str, extra: &[char]) -> bool {
    !value.is_empty()
        && value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || extra.contains(&ch))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    store: Option<StorePatch>,
    sheets: Option<SheetsPatch>,
    bigquery: Option<BigQueryPatch>,
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_id: Option<String>,
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    backend: Option<StoreBackend>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetsPatch {
    spreadsheet_id: Option<String>,
    range: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BigQueryPatch {
    project_id: Option<String>,
    dataset: Option<String>,
    table: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    table: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, StoreBackend};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const BASE_VARS: [(&str, &str); 4] = [
        ("ISSUEBOT_SLACK_APP_ID", "A0TEST"),
        ("ISSUEBOT_SLACK_WEBHOOK_URL", "https://hooks.slack.test/services/T/B/X"),
        ("ISSUEBOT_STORE_ACCESS_TOKEN", "ya29.test-token"),
        ("ISSUEBOT_SHEETS_SPREADSHEET_ID", "sheet-1"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_vars(vars: &[(&str, &str)]) {
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn clear_base_vars() {
        clear_vars(&BASE_VARS.map(|(key, _)| key));
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ISSUEBOT_WEBHOOK", "https://hooks.slack.test/from-env");
        env::set_var("TEST_ISSUEBOT_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("issuebot.toml");
            fs::write(
                &path,
                r#"
[slack]
app_id = "A0FILE"
webhook_url = "${TEST_ISSUEBOT_WEBHOOK}"

[store]
backend = "sheets"
access_token = "${TEST_ISSUEBOT_TOKEN}"

[sheets]
spreadsheet_id = "sheet-from-file"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.slack.webhook_url.expose_secret() == "https://hooks.slack.test/from-env",
                "webhook url should be interpolated from environment",
            )?;
            ensure(
                config
                    .store
                    .access_token
                    .as_ref()
                    .map(|token| token.expose_secret() == "token-from-env")
                    .unwrap_or(false),
                "access token should be interpolated from environment",
            )?;
            ensure(config.sheets.range == "A2:C", "default range should be kept")?;
            Ok(())
        })();

        clear_vars(&["TEST_ISSUEBOT_WEBHOOK", "TEST_ISSUEBOT_TOKEN"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("issuebot.toml");
        fs::write(&path, "[slack]\napp_id = \"${ISSUEBOT_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let result =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(
                result,
                Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "ISSUEBOT_TEST_UNSET_VAR"
            ),
            "unset interpolation variable should fail the load",
        )
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_vars(&BASE_VARS);
        env::set_var("ISSUEBOT_SLACK_APP_ID", "A0ENV");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("issuebot.toml");
            fs::write(
                &path,
                r#"
[slack]
app_id = "A0FILE"

[sheets]
range = "Issues!A2:C"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    sheets_api_base_url: Some("http://127.0.0.1:9".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.slack.app_id == "A0ENV", "env app id should win over file")?;
            ensure(config.sheets.range == "Issues!A2:C", "file range should win over default")?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            ensure(
                config.sheets.api_base_url == "http://127.0.0.1:9",
                "override api base url should win",
            )?;
            Ok(())
        })();

        clear_base_vars();
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_vars(&BASE_VARS);
        env::set_var("ISSUEBOT_LOG_LEVEL", "warn");
        env::set_var("ISSUEBOT_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_base_vars();
        clear_vars(&["ISSUEBOT_LOG_LEVEL", "ISSUEBOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn validation_fails_fast_without_app_id() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_vars(&BASE_VARS[1..]);

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("slack.app_id")
            );
            ensure(has_message, "validation failure should mention slack.app_id")
        })();

        clear_base_vars();
        result
    }

    #[test]
    fn bigquery_backend_requires_table_coordinates() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_vars(&BASE_VARS);
        env::set_var("ISSUEBOT_STORE_BACKEND", "bigquery");
        env::set_var("ISSUEBOT_BIGQUERY_PROJECT_ID", "acme-support");
        env::set_var("ISSUEBOT_BIGQUERY_DATASET", "helpdesk");

        let result = (|| -> Result<(), String> {
            let missing_table = AppConfig::load(LoadOptions::default());
            ensure(
                matches!(
                    missing_table,
                    Err(ConfigError::Validation(ref message)) if message.contains("bigquery.table")
                ),
                "missing table should be reported",
            )?;

            env::set_var("ISSUEBOT_BIGQUERY_TABLE", "issues; DROP TABLE x");
            let bad_table = AppConfig::load(LoadOptions::default());
            ensure(bad_table.is_err(), "table names with punctuation should be rejected")?;

            env::set_var("ISSUEBOT_BIGQUERY_TABLE", "short_codes");
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.store.backend == StoreBackend::BigQuery, "backend should be bigquery")
        })();

        clear_base_vars();
        clear_vars(&[
            "ISSUEBOT_STORE_BACKEND",
            "ISSUEBOT_BIGQUERY_PROJECT_ID",
            "ISSUEBOT_BIGQUERY_DATASET",
            "ISSUEBOT_BIGQUERY_TABLE",
        ]);
        result
    }

    #[test]
    fn sql_backend_needs_no_access_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_vars(&BASE_VARS[..2]);
        env::set_var("ISSUEBOT_STORE_BACKEND", "sql");
        env::set_var("ISSUEBOT_DATABASE_URL", "sqlite::memory:");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.store.backend == StoreBackend::Sql, "backend should be sql")?;
            ensure(config.store.access_token.is_none(), "no access token should be loaded")?;
            ensure(config.database.table == "issues", "default table should be issues")
        })();

        clear_base_vars();
        clear_vars(&["ISSUEBOT_STORE_BACKEND", "ISSUEBOT_DATABASE_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_vars(&BASE_VARS);
        env::set_var("ISSUEBOT_SERVER_PORT", "eighty");

        let result = AppConfig::load(LoadOptions::default());
        clear_base_vars();
        clear_vars(&["ISSUEBOT_SERVER_PORT"]);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "ISSUEBOT_SERVER_PORT"
            ),
            "non-numeric port should be rejected",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_vars(&BASE_VARS);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("hooks.slack.test"),
                "debug output should not contain webhook url",
            )?;
            ensure(
                !debug.contains("ya29.test-token"),
                "debug output should not contain access token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_base_vars();
        result
    }
}
