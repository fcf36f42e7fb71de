//! Method blacklist endpoints
//!
//! - `GET /access/blacklist` - Current snapshot
//! - `PUT /access/blacklist` - Replace it; calls already started keep the old one

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistBody {
    /// Method names, sorted on output
    pub methods: Vec<String>,
}

pub async fn get_blacklist(State(state): State<Arc<AppState>>) -> Json<BlacklistBody> {
    Json(snapshot(&state))
}

pub async fn update_blacklist(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BlacklistBody>,
) -> AppResult<Json<BlacklistBody>> {
    if let Some(blank) = body.methods.iter().find(|m| m.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "method names must not be blank, got '{blank}'"
        )));
    }
    state
        .gateway
        .update_blacklist(body.methods.into_iter().map(|m| m.trim().to_string()));
    Ok(Json(snapshot(&state)))
}

fn snapshot(state: &AppState) -> BlacklistBody {
    let mut methods: Vec<String> = state.gateway.blacklist().iter().cloned().collect();
    methods.sort();
    BlacklistBody { methods }
}
