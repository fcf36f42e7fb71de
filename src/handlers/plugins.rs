//! Plugin-point introspection
//!
//! # Endpoints
//!
//! - `GET /plugins` - Every plugin-point with its resolved plugin order
//! - `GET /plugins/{point}` - One plugin-point, e.g. `call.finished`

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use std::sync::Arc;

use crate::errors::{AppError, AppResult};
use crate::plugin::PluginPointSummary;
use crate::state::AppState;

/// Response for GET /plugins
#[derive(Debug, Serialize)]
pub struct PluginPointsResponse {
    /// Points in pipeline order
    pub points: Vec<PluginPointSummary>,
    /// Total plugins across all points
    pub total_count: usize,
}

pub async fn list_plugin_points(State(state): State<Arc<AppState>>) -> Json<PluginPointsResponse> {
    let points = state.gateway.plugins().describe();
    let total_count = points.iter().map(|p| p.plugins.len()).sum();
    Json(PluginPointsResponse {
        points,
        total_count,
    })
}

pub async fn get_plugin_point(
    State(state): State<Arc<AppState>>,
    Path(point): Path<String>,
) -> AppResult<Json<PluginPointSummary>> {
    state
        .gateway
        .plugins()
        .describe()
        .into_iter()
        .find(|summary| summary.point == point)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("plugin-point '{point}'")))
}
