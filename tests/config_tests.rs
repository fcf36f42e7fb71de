//! Configuration Loading Tests
//!
//! Environment and YAML layering. Tests touching process environment run
//! serially.

use std::io::Write;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::NamedTempFile;

use fanout_gateway::ServerConfig;

const ENV_VARS: [&str; 7] = [
    "HOST",
    "PORT",
    "REQUEST_TIMEOUT_MS",
    "MAX_CALLS_PER_REQUEST",
    "FILTERED_METADATA_KEYS",
    "METHOD_BLACKLIST",
    "BUFFER_POOL_SIZE",
];

fn clear_env() {
    for var in ENV_VARS {
        // SAFETY: tests that mutate the environment are serialized
        unsafe { std::env::remove_var(var) };
    }
}

fn set_env(name: &str, value: &str) {
    // SAFETY: tests that mutate the environment are serialized
    unsafe { std::env::set_var(name, value) };
}

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    clear_env();
    set_env("PORT", "9090");
    set_env("REQUEST_TIMEOUT_MS", "1500");
    set_env("METHOD_BLACKLIST", "admin.drop, admin.reset");
    set_env("FILTERED_METADATA_KEYS", "x-internal");

    let config = ServerConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 9090);
    assert_eq!(config.pipeline.request_timeout_ms, 1500);
    assert!(config.access.blacklist.contains("admin.reset"));
    assert_eq!(config.pipeline.filtered_metadata_keys, vec!["x-internal"]);
}

#[test]
#[serial]
fn test_invalid_env_value_is_reported() {
    clear_env();
    set_env("PORT", "not-a-port");

    let err = ServerConfig::from_env().unwrap_err();
    clear_env();

    assert!(err.to_string().contains("PORT"));
}

#[test]
#[serial]
fn test_yaml_wins_over_env() {
    clear_env();
    set_env("PORT", "9090");
    set_env("MAX_CALLS_PER_REQUEST", "4");

    let file = yaml_file(
        r#"
server:
  port: 7000
pipeline:
  request_timeout_ms: 250
methods:
  - name: "user.get"
    params:
      - name: "id"
        required: true
      - name: "fields"
"#,
    );
    let config = ServerConfig::from_file(&PathBuf::from(file.path())).unwrap();
    clear_env();

    assert_eq!(config.port, 7000);
    assert_eq!(config.pipeline.max_calls_per_request, 4);
    assert_eq!(config.pipeline.request_timeout_ms, 250);
    assert_eq!(config.methods.len(), 1);
    assert!(config.methods[0].params[0].required);
    assert!(!config.methods[0].params[1].required);
}

#[test]
#[serial]
fn test_yaml_validation_failure() {
    clear_env();
    let file = yaml_file(
        r#"
pipeline:
  request_timeout_ms: 0
  max_calls_per_request: 0
"#,
    );

    let err = ServerConfig::from_file(&PathBuf::from(file.path())).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("request_timeout_ms"));
    assert!(message.contains("max_calls_per_request"));
}

#[test]
#[serial]
fn test_malformed_yaml_is_rejected() {
    clear_env();
    let file = yaml_file("server: [unclosed");
    assert!(ServerConfig::from_file(&PathBuf::from(file.path())).is_err());
}
