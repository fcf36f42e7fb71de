//! YAML overrides on top of the environment configuration

use super::ServerConfig;
use super::yaml::YamlConfig;

/// Apply every value present in `yaml` to `base`
pub(super) fn merge_config(mut base: ServerConfig, yaml: YamlConfig) -> ServerConfig {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            base.host = host;
        }
        if let Some(port) = server.port {
            base.port = port;
        }
    }

    if let Some(pipeline) = yaml.pipeline {
        if let Some(timeout) = pipeline.request_timeout_ms {
            base.pipeline.request_timeout_ms = timeout;
        }
        if let Some(limit) = pipeline.max_calls_per_request {
            base.pipeline.max_calls_per_request = limit;
        }
        if let Some(keys) = pipeline.filtered_metadata_keys {
            base.pipeline.filtered_metadata_keys = keys;
        }
    }

    if let Some(buffers) = yaml.buffers {
        if let Some(max_pooled) = buffers.max_pooled {
            base.buffers.max_pooled = max_pooled;
        }
        if let Some(initial) = buffers.initial_capacity {
            base.buffers.initial_capacity = initial;
        }
        if let Some(retained) = buffers.max_retained_bytes {
            base.buffers.max_retained_bytes = retained;
        }
    }

    if let Some(blacklist) = yaml.access.and_then(|a| a.blacklist) {
        base.access.blacklist = blacklist.into_iter().collect();
    }

    if let Some(methods) = yaml.methods {
        base.methods = methods;
    }

    base
}
