pub mod config;
pub mod errors;
pub mod handlers;
pub mod pipeline;
pub mod plugin;
pub mod routes;
pub mod rpc;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use errors::{AppError, AppResult};
pub use pipeline::{Gateway, GatewayBuilder, GatewayResponse};
pub use state::AppState;
