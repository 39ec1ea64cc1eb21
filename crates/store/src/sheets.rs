use async_trait::async_trait;
use issuebot_core::config::{AppConfig, SheetsConfig};
use issuebot_core::{IssueIndex, IssueRow, Resolution, ShortCode};
use reqwest::{header::AUTHORIZATION, Client};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::http::{bearer, build_client, endpoint, ensure_success};
use crate::{index_rows, BackendKind, IssueStore, StoreError};

/// Reads a fixed `code | description | response` range from a spreadsheet
/// and indexes it on every call.
pub struct SheetsIssueStore {
    client: Client,
    api_base_url: String,
    spreadsheet_id: String,
    range: String,
    access_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    range: Option<String>,
    values: Option<Vec<Vec<Value>>>,
}

impl SheetsIssueStore {
    pub fn new(client: Client, config: &SheetsConfig, access_token: SecretString) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.clone(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            range: config.range.clone(),
            access_token,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let access_token = config.store.access_token.clone().ok_or_else(|| {
            StoreError::Configuration("store.access_token is required for sheets".to_string())
        })?;
        let client = build_client(config.store.timeout_secs)?;
        Ok(Self::new(client, &config.sheets, access_token))
    }

    /// Raw rows in sheet order, with incomplete rows already dropped.
    pub async fn fetch_rows(&self) -> Result<Vec<IssueRow>, StoreError> {
        let url = endpoint(
            &self.api_base_url,
            &["v4", "spreadsheets", &self.spreadsheet_id, "values", &self.range],
        )?;
        debug!(
            event_name = "store.sheets.fetch_started",
            spreadsheet_id = %self.spreadsheet_id,
            range = %self.range,
            "reading issue range"
        );

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, bearer(&self.access_token))
            .send()
            .await?;
        let response = ensure_success(BackendKind::Sheets, response).await?;
        let body = response.text().await?;

        let value_range = serde_json::from_str::<Option<ValueRange>>(&body)
            .map_err(|error| StoreError::Decode(format!("sheets value range: {error}")))?
            .ok_or_else(|| StoreError::missing_data(BackendKind::Sheets, "no result object"))?;
        let Some(values) = value_range.values else {
            return Err(StoreError::missing_data(
                BackendKind::Sheets,
                format!(
                    "no data in range `{}`",
                    value_range.range.as_deref().unwrap_or(self.range.as_str())
                ),
            ));
        };

        let total = values.len();
        let rows: Vec<IssueRow> = values
            .iter()
            .filter_map(|cells| {
                let cells: Vec<String> = cells.iter().map(cell_text).collect();
                IssueRow::from_cells(&cells)
            })
            .collect();

        info!(
            event_name = "store.sheets.fetch_completed",
            spreadsheet_id = %self.spreadsheet_id,
            rows = total,
            accepted = rows.len(),
            "issue range loaded"
        );
        Ok(rows)
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl IssueStore for SheetsIssueStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sheets
    }

    async fn fetch_all(&self) -> Result<IssueIndex, StoreError> {
        let rows = self.fetch_rows().await?;
        Ok(index_rows(BackendKind::Sheets, rows))
    }

    async fn fetch_one(&self, code: &ShortCode) -> Result<Resolution, StoreError> {
        let index = self.fetch_all().await?;
        Ok(index.lookup(code))
    }

    async fn probe(&self) -> Result<(), StoreError> {
        self.fetch_rows().await.map(|_| ())
    }
}
