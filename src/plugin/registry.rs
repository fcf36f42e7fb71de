//! Plugin Registry
//!
//! Collects the plugin instances registered for one plugin-point and resolves
//! their descriptors into an [`OrderedPluginList`]. Resolution runs once at
//! startup; the resulting list is immutable and shared for the process
//! lifetime.
//!
//! # Resolution
//!
//! 1. Drop every plugin named by some other plugin's `replaces`
//! 2. Drop a default plugin when a non-default one declares its capability
//! 3. Reject more than one `first` or more than one `last` among survivors
//! 4. Add `before`/`after` edges pairwise, `first -> *` and `* -> last`
//! 5. Sort with [`OrderingGraph`]; a residual cycle is fatal

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::descriptor::PluginDescriptor;
use super::ordering::{GraphError, OrderingGraph};

/// Fatal plugin configuration problems, detected at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Plugin-point '{point}': both '{existing}' and '{duplicate}' are marked first")]
    DuplicateFirst {
        point: &'static str,
        existing: String,
        duplicate: String,
    },

    #[error("Plugin-point '{point}': both '{existing}' and '{duplicate}' are marked last")]
    DuplicateLast {
        point: &'static str,
        existing: String,
        duplicate: String,
    },

    #[error("Plugin-point '{point}': ordering cycle among {plugins:?}")]
    OrderingCycle {
        point: &'static str,
        plugins: Vec<String>,
    },

    #[error("Plugin-point '{point}': plugin '{key}' registered twice")]
    DuplicatePlugin { point: &'static str, key: String },

    #[error("Plugin-point '{point}': unknown plugin '{key}'")]
    UnknownPlugin { point: &'static str, key: String },
}

impl ConfigurationError {
    /// The plugin-point the error was raised for
    pub fn point(&self) -> &'static str {
        match self {
            Self::DuplicateFirst { point, .. }
            | Self::DuplicateLast { point, .. }
            | Self::OrderingCycle { point, .. }
            | Self::DuplicatePlugin { point, .. }
            | Self::UnknownPlugin { point, .. } => point,
        }
    }

    /// Returns true for ordering cycles
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::OrderingCycle { .. })
    }
}

/// A registered plugin together with its descriptor
pub struct PluginEntry<P: ?Sized> {
    pub descriptor: PluginDescriptor,
    pub plugin: Arc<P>,
}

impl<P: ?Sized> Clone for PluginEntry<P> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            plugin: Arc::clone(&self.plugin),
        }
    }
}

impl<P: ?Sized> std::fmt::Debug for PluginEntry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("key", &self.descriptor.key())
            .finish_non_exhaustive()
    }
}

/// Unordered plugin set for one plugin-point
pub struct PluginRegistry<P: ?Sized> {
    point: &'static str,
    entries: Vec<PluginEntry<P>>,
}

impl<P: ?Sized> PluginRegistry<P> {
    pub fn new(point: &'static str) -> Self {
        Self {
            point,
            entries: Vec::new(),
        }
    }

    pub fn point(&self) -> &'static str {
        self.point
    }

    /// Register a plugin instance. Registration order is the tie-break for
    /// otherwise unconstrained plugins.
    pub fn register(&mut self, descriptor: PluginDescriptor, plugin: Arc<P>) -> &mut Self {
        self.entries.push(PluginEntry { descriptor, plugin });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the registered set into its final order
    pub fn resolve(self) -> Result<OrderedPluginList<P>, ConfigurationError> {
        let point = self.point;

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.descriptor.key().to_string()) {
                return Err(ConfigurationError::DuplicatePlugin {
                    point,
                    key: entry.descriptor.key().to_string(),
                });
            }
        }

        let replaced: Vec<String> = self
            .entries
            .iter()
            .flat_map(|e| e.descriptor.replaced_refs().iter().cloned())
            .collect();
        let (survivors, removed): (Vec<_>, Vec<_>) = self
            .entries
            .into_iter()
            .partition(|e| !replaced.iter().any(|r| e.descriptor.matches(r)));
        for entry in &removed {
            info!(point, plugin = entry.descriptor.key(), "Plugin replaced");
        }

        let overridden: Vec<bool> = survivors
            .iter()
            .map(|e| {
                e.descriptor.is_default()
                    && survivors.iter().any(|other| {
                        !other.descriptor.is_default()
                            && other.descriptor.capability_name() == e.descriptor.capability_name()
                    })
            })
            .collect();
        let survivors: Vec<PluginEntry<P>> = survivors
            .into_iter()
            .zip(overridden)
            .filter_map(|(entry, overridden)| {
                if overridden {
                    info!(point, plugin = entry.descriptor.key(), "Default plugin overridden");
                    None
                } else {
                    Some(entry)
                }
            })
            .collect();

        let first = single_marked(&survivors, PluginDescriptor::is_first, |existing, duplicate| {
            ConfigurationError::DuplicateFirst {
                point,
                existing,
                duplicate,
            }
        })?;
        let last = single_marked(&survivors, PluginDescriptor::is_last, |existing, duplicate| {
            ConfigurationError::DuplicateLast {
                point,
                existing,
                duplicate,
            }
        })?;

        let keys: Vec<String> = survivors.iter().map(|e| e.descriptor.key().to_string()).collect();
        let mut graph = OrderingGraph::new();
        for (key, entry) in keys.iter().zip(&survivors) {
            graph.add_node(key.clone(), entry.clone());
        }

        let graph_err = |err: GraphError<String>| match err {
            GraphError::UnknownNode(key) => ConfigurationError::UnknownPlugin { point, key },
            GraphError::Cycle { remaining } => ConfigurationError::OrderingCycle {
                point,
                plugins: remaining,
            },
        };

        for (a, a_key) in survivors.iter().zip(&keys) {
            for (b, b_key) in survivors.iter().zip(&keys) {
                if a_key != b_key && a.descriptor.precedes(&b.descriptor) {
                    graph.add_edge(a_key, b_key).map_err(graph_err)?;
                }
            }
        }
        for key in &keys {
            if let Some(first) = first.as_ref().filter(|first| *first != key) {
                graph.add_edge(first, key).map_err(graph_err)?;
            }
            if let Some(last) = last.as_ref().filter(|last| *last != key) {
                graph.add_edge(key, last).map_err(graph_err)?;
            }
        }

        let ordered: Vec<PluginEntry<P>> = graph
            .into_ordered()
            .map_err(graph_err)?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect();

        debug!(
            point,
            order = ?ordered.iter().map(|e| e.descriptor.key()).collect::<Vec<_>>(),
            "Resolved plugin order"
        );

        Ok(OrderedPluginList {
            point,
            entries: ordered.into(),
        })
    }
}

fn single_marked<P: ?Sized>(
    entries: &[PluginEntry<P>],
    marked: fn(&PluginDescriptor) -> bool,
    duplicate: impl Fn(String, String) -> ConfigurationError,
) -> Result<Option<String>, ConfigurationError> {
    let mut found: Option<String> = None;
    for entry in entries.iter().filter(|e| marked(&e.descriptor)) {
        let key = entry.descriptor.key().to_string();
        match found {
            Some(existing) => return Err(duplicate(existing, key)),
            None => found = Some(key),
        }
    }
    Ok(found)
}

/// Immutable, resolved plugin order for one plugin-point. Cheap to clone.
pub struct OrderedPluginList<P: ?Sized> {
    point: &'static str,
    entries: Arc<[PluginEntry<P>]>,
}

impl<P: ?Sized> Clone for OrderedPluginList<P> {
    fn clone(&self) -> Self {
        Self {
            point: self.point,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<P: ?Sized> std::fmt::Debug for OrderedPluginList<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedPluginList")
            .field("point", &self.point)
            .field("keys", &self.keys())
            .finish()
    }
}

impl<P: ?Sized> OrderedPluginList<P> {
    pub fn point(&self) -> &'static str {
        self.point
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PluginEntry<P>] {
        &self.entries
    }

    /// Plugin keys in execution order
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.descriptor.key()).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }
}
