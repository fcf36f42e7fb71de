//! Side-channel call metadata
//!
//! Backends may return string metadata next to their results. The request's
//! merged map is last-write-wins per key, except the service-log key, whose
//! fragments are appended space-joined.

use std::collections::BTreeMap;

use serde::Serialize;

/// Reserved key whose values accumulate across calls
pub const SERVICE_LOG_KEY: &str = "_service_log";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CallMetadata(BTreeMap<String, String>);

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge `other` into this map
    pub fn merge(&mut self, other: CallMetadata) {
        for (key, value) in other.0 {
            if key == SERVICE_LOG_KEY {
                match self.0.get_mut(&key) {
                    Some(existing) if !existing.is_empty() => {
                        if !value.is_empty() {
                            existing.push(' ');
                            existing.push_str(&value);
                        }
                    }
                    _ => {
                        self.0.insert(key, value);
                    }
                }
            } else {
                self.0.insert(key, value);
            }
        }
    }

    /// Drop transport-internal keys
    pub fn without_keys<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        for key in keys {
            self.0.remove(key.as_ref());
        }
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_log_is_appended() {
        let mut merged = CallMetadata::new();
        merged.merge(CallMetadata::from_iter([(SERVICE_LOG_KEY, "a=1")]));
        merged.merge(CallMetadata::from_iter([(SERVICE_LOG_KEY, "b=2")]));
        assert_eq!(merged.get(SERVICE_LOG_KEY), Some("a=1 b=2"));
    }

    #[test]
    fn test_other_keys_last_write_wins() {
        let mut merged = CallMetadata::new();
        merged.merge(CallMetadata::from_iter([("region", "eu"), ("x", "1")]));
        merged.merge(CallMetadata::from_iter([("region", "us")]));
        assert_eq!(merged.get("region"), Some("us"));
        assert_eq!(merged.get("x"), Some("1"));
    }

    #[test]
    fn test_empty_log_fragments() {
        let mut merged = CallMetadata::new();
        merged.merge(CallMetadata::from_iter([(SERVICE_LOG_KEY, "")]));
        merged.merge(CallMetadata::from_iter([(SERVICE_LOG_KEY, "first")]));
        merged.merge(CallMetadata::from_iter([(SERVICE_LOG_KEY, "")]));
        assert_eq!(merged.get(SERVICE_LOG_KEY), Some("first"));
    }

    #[test]
    fn test_without_keys() {
        let metadata = CallMetadata::from_iter([("rpc.trace_id", "t"), ("keep", "k")]);
        let filtered = metadata.without_keys(&["rpc.trace_id", "rpc.span_id"]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("keep"), Some("k"));
    }
}
