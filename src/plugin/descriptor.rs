//! Plugin descriptors
//!
//! A descriptor names a plugin and states how it wants to be ordered at its
//! plugin-point. Keys are `::`-separated paths (`gateway::access::AccessLog`);
//! an ordering or replacement reference matches a plugin whose key equals the
//! reference or lives under it, so `gateway::access` matches every plugin in
//! that namespace.

use std::collections::BTreeSet;

use serde::Serialize;

/// Ordering and selection constraints of a single plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    key: String,
    capability: String,
    /// Plugins this one must run after
    before: BTreeSet<String>,
    /// Plugins this one must run before
    after: BTreeSet<String>,
    first: bool,
    last: bool,
    #[serde(rename = "replace")]
    replaces: BTreeSet<String>,
    #[serde(rename = "defaults")]
    default: bool,
}

impl PluginDescriptor {
    /// A descriptor with no constraints. The capability defaults to the key,
    /// so a plugin only competes with others that declare the same one.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            capability: key.clone(),
            key,
            before: BTreeSet::new(),
            after: BTreeSet::new(),
            first: false,
            last: false,
            replaces: BTreeSet::new(),
            default: false,
        }
    }

    /// Declare the capability this plugin provides
    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    /// Every plugin matching `reference` runs before this one
    pub fn before(mut self, reference: impl Into<String>) -> Self {
        self.before.insert(reference.into());
        self
    }

    /// This plugin runs before every plugin matching `reference`
    pub fn after(mut self, reference: impl Into<String>) -> Self {
        self.after.insert(reference.into());
        self
    }

    /// Precede every other plugin at the point
    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    /// Follow every other plugin at the point
    pub fn last(mut self) -> Self {
        self.last = true;
        self
    }

    /// Remove every plugin matching `reference` from the point
    pub fn replaces(mut self, reference: impl Into<String>) -> Self {
        self.replaces.insert(reference.into());
        self
    }

    /// Mark as a fallback: dropped whenever a non-default plugin with the
    /// same capability is registered
    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capability_name(&self) -> &str {
        &self.capability
    }

    pub fn before_refs(&self) -> &BTreeSet<String> {
        &self.before
    }

    pub fn after_refs(&self) -> &BTreeSet<String> {
        &self.after
    }

    pub fn replaced_refs(&self) -> &BTreeSet<String> {
        &self.replaces
    }

    pub fn is_first(&self) -> bool {
        self.first
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    /// The key followed by each enclosing namespace, innermost first
    pub fn lineage(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(Some(self.key.as_str()), |key| {
            key.rsplit_once("::").map(|(parent, _)| parent)
        })
    }

    /// Whether `reference` names this plugin or one of its namespaces
    pub fn matches(&self, reference: &str) -> bool {
        self.lineage().any(|key| key == reference)
    }

    /// Whether this plugin must run before `other`
    pub(crate) fn precedes(&self, other: &PluginDescriptor) -> bool {
        self.after.iter().any(|r| other.matches(r)) || other.before.iter().any(|r| self.matches(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_walks_namespaces() {
        let d = PluginDescriptor::new("gateway::access::AccessLog");
        let lineage: Vec<_> = d.lineage().collect();
        assert_eq!(
            lineage,
            vec!["gateway::access::AccessLog", "gateway::access", "gateway"]
        );
    }

    #[test]
    fn test_matches_enclosing_namespace() {
        let d = PluginDescriptor::new("gateway::access::AccessLog");
        assert!(d.matches("gateway::access::AccessLog"));
        assert!(d.matches("gateway::access"));
        assert!(!d.matches("gateway::acc"));
        assert!(!d.matches("gateway::access::AccessLogger"));
    }

    #[test]
    fn test_precedes_from_both_sides() {
        let a = PluginDescriptor::new("a").after("b");
        let b = PluginDescriptor::new("b");
        assert!(a.precedes(&b));
        assert!(!b.precedes(&a));

        let c = PluginDescriptor::new("c");
        let d = PluginDescriptor::new("d").before("c");
        assert!(c.precedes(&d));
        assert!(!d.precedes(&c));
    }

    #[test]
    fn test_capability_defaults_to_key() {
        let d = PluginDescriptor::new("x::Writer");
        assert_eq!(d.capability_name(), "x::Writer");
        let d = d.capability("result.writer").as_default();
        assert_eq!(d.capability_name(), "result.writer");
        assert!(d.is_default());
    }
}
