//! Semantic validation of the final configuration
//!
//! Every check runs; the error lists all violations at once.

use std::collections::HashSet;

use thiserror::Error;

use super::ServerConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid configuration: {}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

pub(super) fn validate(config: &ServerConfig) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if config.pipeline.request_timeout_ms == 0 {
        errors.push("pipeline.request_timeout_ms must be greater than 0".to_string());
    }
    if config.pipeline.max_calls_per_request == 0 {
        errors.push("pipeline.max_calls_per_request must be greater than 0".to_string());
    }
    if config.buffers.initial_capacity == 0 {
        errors.push("buffers.initial_capacity must be greater than 0".to_string());
    }
    if config.buffers.max_retained_bytes < config.buffers.initial_capacity {
        errors.push(format!(
            "buffers.max_retained_bytes ({}) is below buffers.initial_capacity ({})",
            config.buffers.max_retained_bytes, config.buffers.initial_capacity
        ));
    }

    let mut seen = HashSet::new();
    for method in &config.methods {
        if method.name.trim().is_empty() {
            errors.push("methods: method name must not be empty".to_string());
        } else if !seen.insert(method.name.as_str()) {
            errors.push(format!("methods: duplicate method '{}'", method.name));
        }
        let mut params = HashSet::new();
        for param in &method.params {
            if !params.insert(param.name.as_str()) {
                errors.push(format!(
                    "methods: duplicate parameter '{}' on '{}'",
                    param.name, method.name
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}
