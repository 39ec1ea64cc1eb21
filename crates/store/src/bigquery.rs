use async_trait::async_trait;
use issuebot_core::config::{AppConfig, BigQueryConfig};
use issuebot_core::{IssueIndex, Resolution, ShortCode};
use reqwest::{header::AUTHORIZATION, Client};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::http::{bearer, build_client, endpoint, ensure_success};
use crate::{BackendKind, IssueStore, StoreError};

const RESPONSE_FIELD: &str = "response";

/// Point lookups against a warehouse table through the synchronous query
/// endpoint. The code is bound as a named parameter and matched verbatim.
pub struct BigQueryIssueStore {
    client: Client,
    api_base_url: String,
    project_id: String,
    dataset: String,
    table: String,
    access_token: SecretString,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: String,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: [QueryParameter<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter<'a> {
    name: &'static str,
    parameter_type: ParameterType,
    parameter_value: ParameterValue<'a>,
}

#[derive(Debug, Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterValue<'a> {
    value: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

impl BigQueryIssueStore {
    pub fn new(client: Client, config: &BigQueryConfig, access_token: SecretString) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.clone(),
            project_id: config.project_id.clone(),
            dataset: config.dataset.clone(),
            table: config.table.clone(),
            access_token,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let access_token = config.store.access_token.clone().ok_or_else(|| {
            StoreError::Configuration("store.access_token is required for bigquery".to_string())
        })?;
        let client = build_client(config.store.timeout_secs)?;
        Ok(Self::new(client, &config.bigquery, access_token))
    }

    fn lookup_sql(&self) -> String {
        format!(
            "SELECT {RESPONSE_FIELD} FROM `{}.{}.{}` WHERE code = @code LIMIT 1",
            self.project_id, self.dataset, self.table
        )
    }

    async fn run_lookup(&self, code: &str) -> Result<QueryResponse, StoreError> {
        let segments = ["bigquery", "v2", "projects", self.project_id.as_str(), "queries"];
        let url = endpoint(&self.api_base_url, &segments)?;
        let request = QueryRequest {
            query: self.lookup_sql(),
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: [QueryParameter {
                name: "code",
                parameter_type: ParameterType { kind: "STRING" },
                parameter_value: ParameterValue { value: code },
            }],
        };

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, bearer(&self.access_token))
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(BackendKind::BigQuery, response).await?;
        let body = response.text().await?;

        serde_json::from_str::<Option<QueryResponse>>(&body)
            .map_err(|error| StoreError::Decode(format!("bigquery query response: {error}")))?
            .ok_or_else(|| StoreError::missing_data(BackendKind::BigQuery, "no result object"))
    }
}

fn response_column(schema: Option<&TableSchema>) -> usize {
    schema
        .and_then(|schema| schema.fields.iter().position(|field| field.name == RESPONSE_FIELD))
        .unwrap_or(0)
}

#[async_trait]
impl IssueStore for BigQueryIssueStore {
    fn backend(&self) -> BackendKind {
        BackendKind::BigQuery
    }

    async fn fetch_all(&self) -> Result<IssueIndex, StoreError> {
        Err(StoreError::Unsupported { backend: BackendKind::BigQuery, operation: "fetch_all" })
    }

    async fn fetch_one(&self, code: &ShortCode) -> Result<Resolution, StoreError> {
        let result = self.run_lookup(code.raw()).await?;
        if result.job_complete != Some(true) {
            return Err(StoreError::missing_data(
                BackendKind::BigQuery,
                "query job did not complete",
            ));
        }

        let column = response_column(result.schema.as_ref());
        let text = result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.f.into_iter().nth(column))
            .and_then(|cell| match cell.v {
                Value::String(text) => Some(text),
                Value::Null => None,
                other => Some(other.to_string()),
            });

        debug!(
            event_name = "store.bigquery.lookup_completed",
            project_id = %self.project_id,
            code = %code.raw(),
            found = text.is_some(),
            "issue lookup finished"
        );
        Ok(text.into())
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let url = endpoint(
            &self.api_base_url,
            &[
                "bigquery",
                "v2",
                "projects",
                &self.project_id,
                "datasets",
                &self.dataset,
                "tables",
                &self.table,
            ],
        )?;
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, bearer(&self.access_token))
            .send()
            .await?;
        ensure_success(BackendKind::BigQuery, response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use issuebot_core::config::BigQueryConfig;
    use issuebot_core::{Resolution, ShortCode};
    use reqwest::Client;
    use serde_json::json;

    use super::BigQueryIssueStore;
    use crate::{IssueStore, StoreError};

    const QUERY_PATH: &str = "/bigquery/v2/projects/helpdesk/queries";

    fn store(base_url: &str) -> BigQueryIssueStore {
        BigQueryIssueStore::new(
            Client::new(),
            &BigQueryConfig {
                project_id: "helpdesk".to_string(),
                dataset: "support".to_string(),
                table: "issues".to_string(),
                api_base_url: base_url.to_string(),
            },
            "ya29.test".to_string().into(),
        )
    }

    #[tokio::test]
    async fn fetch_one_binds_code_as_named_parameter() {
        let server = MockServer::start();
        let query = server.mock(|when, then| {
            when.method(POST)
                .path(QUERY_PATH)
                .header("authorization", "Bearer ya29.test")
                .body_includes("WHERE code = @code LIMIT 1")
                .body_includes("`helpdesk.support.issues`")
                .body_includes("\"parameterMode\":\"NAMED\"")
                .body_includes("\"value\":\"vpn\"");
            then.status(200).json_body(json!({
                "kind": "bigquery#queryResponse",
                "jobComplete": true,
                "schema": { "fields": [{ "name": "response", "type": "STRING" }] },
                "rows": [{ "f": [{ "v": "Restart the client" }] }],
                "totalRows": "1"
            }));
        });

        let resolution = store(&server.base_url()).fetch_one(&ShortCode::new("vpn")).await;

        query.assert();
        assert_eq!(resolution.expect("lookup"), Resolution::Found("Restart the client".into()));
    }

    #[tokio::test]
    async fn locates_response_column_by_name() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(QUERY_PATH);
            then.status(200).json_body(json!({
                "jobComplete": true,
                "schema": { "fields": [{ "name": "code" }, { "name": "response" }] },
                "rows": [{ "f": [{ "v": "vpn" }, { "v": "Restart the client" }] }]
            }));
        });

        let resolution = store(&server.base_url()).fetch_one(&ShortCode::new("vpn")).await;
        assert_eq!(resolution.expect("lookup"), Resolution::Found("Restart the client".into()));
    }

    #[tokio::test]
    async fn empty_result_set_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(QUERY_PATH);
            then.status(200).json_body(json!({
                "jobComplete": true,
                "schema": { "fields": [{ "name": "response" }] },
                "totalRows": "0"
            }));
        });

        let resolution = store(&server.base_url()).fetch_one(&ShortCode::new("bye")).await;
        assert_eq!(resolution.expect("lookup"), Resolution::NotFound);
    }

    #[tokio::test]
    async fn null_cell_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(QUERY_PATH);
            then.status(200).json_body(json!({
                "jobComplete": true,
                "rows": [{ "f": [{ "v": null }] }]
            }));
        });

        let resolution = store(&server.base_url()).fetch_one(&ShortCode::new("vpn")).await;
        assert_eq!(resolution.expect("lookup"), Resolution::NotFound);
    }

    #[tokio::test]
    async fn incomplete_job_is_backend_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(QUERY_PATH);
            then.status(200).json_body(json!({
                "jobComplete": false,
                "jobReference": { "projectId": "helpdesk", "jobId": "job_1" }
            }));
        });

        let error = store(&server.base_url())
            .fetch_one(&ShortCode::new("vpn"))
            .await
            .expect_err("incomplete job");
        assert!(matches!(error, StoreError::BackendUnavailable { status: 500, .. }));
    }

    #[tokio::test]
    async fn enumeration_is_unsupported() {
        let server = MockServer::start();
        let error = store(&server.base_url()).fetch_all().await.expect_err("unsupported");
        assert!(matches!(error, StoreError::Unsupported { operation: "fetch_all", .. }));
    }

    #[tokio::test]
    async fn probe_reads_table_metadata() {
        let server = MockServer::start();
        let metadata = server.mock(|when, then| {
            when.method(GET).path("/bigquery/v2/projects/helpdesk/datasets/support/tables/issues");
            then.status(200).json_body(json!({ "id": "helpdesk:support.issues" }));
        });

        store(&server.base_url()).probe().await.expect("probe");
        metadata.assert();
    }

    #[tokio::test]
    async fn probe_surfaces_upstream_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bigquery/v2/projects/helpdesk/datasets/support/tables/issues");
            then.status(404).body("Not found: Table helpdesk:support.issues");
        });

        let error = store(&server.base_url()).probe().await.expect_err("missing table");
        assert!(matches!(error, StoreError::BackendUnavailable { status: 404, .. }));
    }
}
