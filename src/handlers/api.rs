use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::pipeline::{GatewayResponse, MetricsSnapshot};
use crate::state::AppState;

/// Header carrying the client-supplied correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /m.api` with the call list in the query string
pub async fn multi_call_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Response> {
    serve(&state, &headers, params).await
}

/// `POST /m.api` with an url-encoded form; form fields win over the query string
pub async fn multi_call_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(mut params): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> AppResult<Response> {
    params.extend(form);
    serve(&state, &headers, params).await
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.gateway.metrics().snapshot())
}

async fn serve(
    state: &AppState,
    headers: &HeaderMap,
    params: HashMap<String, String>,
) -> AppResult<Response> {
    let cid = request_id(headers);
    debug!(cid = %cid, params = params.len(), "Multi-call request received");
    let response = state.gateway.handle(cid, params).await;
    into_http(response)
}

/// Reuse the caller's request id when it is printable, otherwise mint one
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn into_http(response: GatewayResponse) -> AppResult<Response> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|e| AppError::Internal(format!("invalid status {}: {e}", response.status)))?;
    let cid = HeaderValue::from_str(&response.cid)
        .map_err(|e| AppError::Internal(format!("invalid request id: {e}")))?;

    Ok((
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::HeaderName::from_static(REQUEST_ID_HEADER), cid),
        ],
        response.body,
    )
        .into_response())
}
