use serde::Deserialize;
use std::path::PathBuf;

use crate::rpc::MethodDescriptor;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration; anything left out
/// keeps the value from the environment or the default.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///
/// pipeline:
///   request_timeout_ms: 60000
///   max_calls_per_request: 32
///   filtered_metadata_keys: ["rpc.trace_id", "rpc.span_id"]
///
/// buffers:
///   max_pooled: 256
///   initial_capacity: 4096
///   max_retained_bytes: 1048576
///
/// access:
///   blacklist: ["admin.drop"]
///
/// methods:
///   - name: "user.get"
///     params:
///       - name: "id"
///         required: true
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub pipeline: Option<PipelineYaml>,
    pub buffers: Option<BuffersYaml>,
    pub access: Option<AccessYaml>,
    pub methods: Option<Vec<MethodDescriptor>>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Call graph execution settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineYaml {
    pub request_timeout_ms: Option<u64>,
    pub max_calls_per_request: Option<usize>,
    pub filtered_metadata_keys: Option<Vec<String>>,
}

/// Buffer pool settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BuffersYaml {
    pub max_pooled: Option<usize>,
    pub initial_capacity: Option<usize>,
    pub max_retained_bytes: Option<usize>,
}

/// Access control from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AccessYaml {
    pub blacklist: Option<Vec<String>>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

pipeline:
  request_timeout_ms: 1500
  max_calls_per_request: 4
  filtered_metadata_keys: ["rpc.trace_id"]

buffers:
  max_pooled: 8

access:
  blacklist: ["admin.drop", "admin.reset"]

methods:
  - name: "user.get"
    params:
      - name: "id"
        required: true
      - name: "fields"
  - name: "sys.time"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(9090));

        let pipeline = config.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.request_timeout_ms, Some(1500));
        assert_eq!(pipeline.max_calls_per_request, Some(4));

        assert_eq!(config.buffers.as_ref().unwrap().max_pooled, Some(8));
        assert!(config.buffers.as_ref().unwrap().initial_capacity.is_none());
        assert_eq!(config.access.as_ref().unwrap().blacklist.as_ref().unwrap().len(), 2);

        let methods = config.methods.as_ref().unwrap();
        assert_eq!(methods.len(), 2);
        assert!(methods[0].params[0].required);
        assert!(!methods[0].params[1].required);
        assert!(methods[1].params.is_empty());
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
server:
  port: 9000
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.server.as_ref().unwrap().host.is_none());
        assert_eq!(config.server.as_ref().unwrap().port, Some(9000));
        assert!(config.pipeline.is_none());
        assert!(config.methods.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();

        assert!(config.server.is_none());
        assert!(config.pipeline.is_none());
        assert!(config.buffers.is_none());
        assert!(config.access.is_none());
    }
}
