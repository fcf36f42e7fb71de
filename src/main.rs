use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fanout_gateway::{
    ServerConfig, routes,
    rpc::{LocalTransport, StaticSchemaRegistry},
    state::AppState,
};

/// Fanout Gateway - runs dependent backend calls and aggregates one response
#[derive(Parser, Debug)]
#[command(name = "fanout-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fanout_gateway=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let transport = Arc::new(LocalTransport::with_demo_methods());
    let schema = StaticSchemaRegistry::from_descriptors(LocalTransport::demo_schema());
    for method in &config.methods {
        if !transport.is_bound(&method.name) {
            warn!(method = %method.name, "Method has no local backend; calls will fail");
        }
        schema.register(method.clone());
    }
    info!(methods = schema.len(), "Schema registry seeded");

    let address = config.address();
    let app_state = AppState::new(config, transport, Arc::new(schema))
        .map_err(|e| anyhow!("Failed to assemble gateway: {e}"))?;

    let app = routes::api::create_api_router().with_state(app_state);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!("Server listening on http://{}", socket_addr);
    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
