use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use issuebot_store::IssueStore;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    store: Arc<dyn IssueStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub backend: HealthCheck,
    pub checked_at: String,
}

pub fn router(store: Arc<dyn IssueStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let backend = backend_check(state.store.as_ref()).await;
    let ready = backend.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "issuebot-server accepting events".to_string(),
        },
        backend,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn backend_check(store: &dyn IssueStore) -> HealthCheck {
    match store.probe().await {
        Ok(()) => HealthCheck {
            status: "ready",
            detail: format!("{} backend reachable", store.backend()),
        },
        Err(error) => HealthCheck { status: "degraded", detail: error.to_string() },
    }
}
