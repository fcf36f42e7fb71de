use std::sync::Arc;

use crate::config::ServerConfig;
use crate::pipeline::Gateway;
use crate::plugin::ConfigurationError;
use crate::rpc::{RpcTransport, SchemaRegistry};

/// Shared state for every HTTP handler
pub struct AppState {
    pub config: ServerConfig,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    /// Assemble the gateway for `config`, resolving every plugin-point
    pub fn new(
        config: ServerConfig,
        transport: Arc<dyn RpcTransport>,
        schema: Arc<dyn SchemaRegistry>,
    ) -> Result<Arc<Self>, ConfigurationError> {
        let gateway = Gateway::builder(transport, schema).config(&config).build()?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    pub fn with_gateway(config: ServerConfig, gateway: Arc<Gateway>) -> Arc<Self> {
        Arc::new(Self { config, gateway })
    }
}
