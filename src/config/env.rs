//! Environment variable loading

use std::str::FromStr;

use super::ServerConfig;

/// Build a configuration from environment variables over the defaults
///
/// | Variable                  | Field                                   |
/// |---------------------------|-----------------------------------------|
/// | `HOST`                    | `host`                                  |
/// | `PORT`                    | `port`                                  |
/// | `REQUEST_TIMEOUT_MS`      | `pipeline.request_timeout_ms`           |
/// | `MAX_CALLS_PER_REQUEST`   | `pipeline.max_calls_per_request`        |
/// | `FILTERED_METADATA_KEYS`  | `pipeline.filtered_metadata_keys` (csv) |
/// | `METHOD_BLACKLIST`        | `access.blacklist` (csv)                |
/// | `BUFFER_POOL_SIZE`        | `buffers.max_pooled`                    |
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_var("PORT")? {
        config.port = port;
    }
    if let Some(timeout) = parse_var("REQUEST_TIMEOUT_MS")? {
        config.pipeline.request_timeout_ms = timeout;
    }
    if let Some(limit) = parse_var("MAX_CALLS_PER_REQUEST")? {
        config.pipeline.max_calls_per_request = limit;
    }
    if let Some(keys) = var("FILTERED_METADATA_KEYS") {
        config.pipeline.filtered_metadata_keys = split_list(&keys);
    }
    if let Some(blacklist) = var("METHOD_BLACKLIST") {
        config.access.blacklist = split_list(&blacklist).into_iter().collect();
    }
    if let Some(size) = parse_var("BUFFER_POOL_SIZE")? {
        config.buffers.max_pooled = size;
    }

    Ok(config)
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("Invalid value for {name}: '{raw}' ({e})"))
        })
        .transpose()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
