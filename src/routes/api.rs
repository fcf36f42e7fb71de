use axum::{
    Router,
    routing::get,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{access, api, plugins};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router
///
/// `/m.api` accepts both GET and POST with the same semantics.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/m.api", get(api::multi_call_get).post(api::multi_call_post))
        .route("/metrics", get(api::metrics))
        .route("/plugins", get(plugins::list_plugin_points))
        .route("/plugins/{point}", get(plugins::get_plugin_point))
        .route(
            "/access/blacklist",
            get(access::get_blacklist).put(access::update_blacklist),
        )
        .layer(TraceLayer::new_for_http())
}
