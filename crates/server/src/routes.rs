use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use issuebot_core::domain::issue::LIST_CODE;
use issuebot_core::{ApplicationError, InterfaceError, Resolution, ShortCode};
use issuebot_slack::events::{RETRY_NUM_HEADER, RETRY_REASON_HEADER};
use issuebot_slack::{
    DispatchCoordinator, FollowUpTasks, InboundRequest, RetryMetadata, SyncReply,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<DispatchCoordinator>,
    follow_ups: FollowUpTasks,
}

impl AppState {
    pub fn new(coordinator: Arc<DispatchCoordinator>) -> Self {
        Self { coordinator, follow_ups: FollowUpTasks::new() }
    }

    /// Resolutions still running after their event was acknowledged.
    pub fn follow_ups(&self) -> &FollowUpTasks {
        &self.follow_ups
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueQuery {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: String,
    correlation_id: &'a str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/issues", get(issues_from_query).post(issues_from_body))
        .with_state(state)
}

/// Always answers 200 so the platform never redelivers because of us. The
/// resolution runs after the reply on a task tracked in `follow_ups`.
async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(
                event_name = "server.slack_events.body_rejected",
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "inbound body could not be read; acknowledging anyway"
            );
            return StatusCode::OK.into_response();
        }
    };

    let retry = RetryMetadata::new(
        header_value(&headers, RETRY_NUM_HEADER),
        header_value(&headers, RETRY_REASON_HEADER),
    );

    let request = match InboundRequest::parse(&body, retry) {
        Ok(request) => request,
        Err(error) => {
            warn!(
                event_name = "server.slack_events.unparseable",
                error = %error,
                bytes = body.len(),
                "inbound body is not a JSON event payload"
            );
            return StatusCode::OK.into_response();
        }
    };

    match state.coordinator.dispatch(&request, &state.follow_ups) {
        SyncReply::Challenge(challenge) => {
            (StatusCode::OK, [(CONTENT_TYPE, TEXT_PLAIN)], challenge).into_response()
        }
        SyncReply::Empty => StatusCode::OK.into_response(),
    }
}

async fn issues_from_query(
    State(state): State<AppState>,
    Query(query): Query<IssueQuery>,
) -> Response {
    lookup(&state, query.code).await
}

async fn issues_from_body(
    State(state): State<AppState>,
    Query(query): Query<IssueQuery>,
    body: Bytes,
) -> Response {
    let code = query.code.or_else(|| {
        serde_json::from_slice::<IssueQuery>(&body).ok().and_then(|payload| payload.code)
    });
    lookup(&state, code).await
}

async fn lookup(state: &AppState, code: Option<String>) -> Response {
    let correlation_id = format!("req-{}", Uuid::new_v4().simple());
    let raw = code.filter(|code| !code.is_empty()).unwrap_or_else(|| LIST_CODE.to_owned());

    let code = match ShortCode::parse_strict(&raw) {
        Ok(code) => code,
        Err(error) => return error_response(ApplicationError::from(error), correlation_id),
    };

    let resolver = state.coordinator.resolver();
    let result = if code.normalized() == LIST_CODE {
        resolver.list().await.map(Resolution::Found)
    } else {
        resolver.resolve(code.raw()).await
    };

    match result {
        Ok(Resolution::Found(text)) => {
            info!(
                event_name = "server.issues.found",
                correlation_id = %correlation_id,
                code = %code.normalized(),
                "issue lookup served"
            );
            (StatusCode::OK, [(CONTENT_TYPE, TEXT_PLAIN)], text).into_response()
        }
        Ok(Resolution::NotFound) => interface_response(InterfaceError::not_found(
            format!("no response configured for `{}`", code.raw()),
            correlation_id,
        )),
        Err(error) => error_response(ApplicationError::from(error), correlation_id),
    }
}

fn error_response(error: ApplicationError, correlation_id: String) -> Response {
    interface_response(error.into_interface(correlation_id))
}

fn interface_response(error: InterfaceError) -> Response {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.issues.failed",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "issue lookup failed"
    );

    let body = ErrorBody {
        error: error.user_message(),
        detail: error.to_string(),
        correlation_id: error.correlation_id(),
    };
    (status, Json(body)).into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
}
