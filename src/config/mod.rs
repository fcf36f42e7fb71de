//! Configuration module for the fanout gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Semantic checks on the final configuration
//!
//! # Example
//! ```rust,no_run
//! use fanout_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::rpc::MethodDescriptor;

mod env;
mod merge;
mod validation;
mod yaml;

pub use validation::ValidationErrors;
pub use yaml::YamlConfig;

/// Metadata keys used by RPC plumbing, never echoed to clients
pub const DEFAULT_FILTERED_METADATA_KEYS: [&str; 3] =
    ["rpc.trace_id", "rpc.span_id", "rpc.attachment"];

/// Call graph execution settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// End-to-end deadline for one request
    pub request_timeout_ms: u64,
    pub max_calls_per_request: usize,
    /// Metadata keys stripped from backend replies
    pub filtered_metadata_keys: Vec<String>,
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 60_000,
            max_calls_per_request: 32,
            filtered_metadata_keys: DEFAULT_FILTERED_METADATA_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Result buffer pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub max_pooled: usize,
    pub initial_capacity: usize,
    /// Buffers that grew beyond this are dropped instead of pooled
    pub max_retained_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_pooled: 256,
            initial_capacity: 4096,
            max_retained_bytes: 1024 * 1024,
        }
    }
}

/// Method access control
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessConfig {
    pub blacklist: HashSet<String>,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pipeline: PipelineConfig,
    pub buffers: BufferConfig,
    pub access: AccessConfig,
    /// Seed entries for the schema registry
    pub methods: Vec<MethodDescriptor>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            pipeline: PipelineConfig::default(),
            buffers: BufferConfig::default(),
            access: AccessConfig::default(),
            methods: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// The .env file is loaded into the environment by `main` before this
    /// runs, so actual environment variables override .env values.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(env::load_from_env()?, yaml_config);
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "0.0.0.0:8080");
        assert_eq!(config.pipeline.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.pipeline.filtered_metadata_keys.len(), 3);
        assert_eq!(config.buffers.max_retained_bytes, 1_048_576);
        assert!(config.access.blacklist.is_empty());
    }
}
