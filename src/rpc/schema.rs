//! Method schema registry
//!
//! The parser resolves every requested method name against a
//! [`SchemaRegistry`]. The static implementation is seeded from configuration
//! and can be extended at runtime.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One declared parameter of a backend method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Backend method as known to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Position of a parameter in the argument vector
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

/// Lookup of method descriptors by name
pub trait SchemaRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<MethodDescriptor>>;

    /// Names of every known method, sorted
    fn method_names(&self) -> Vec<String>;
}

/// In-memory schema registry
#[derive(Debug, Default)]
pub struct StaticSchemaRegistry {
    methods: DashMap<String, Arc<MethodDescriptor>>,
}

impl StaticSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = MethodDescriptor>) -> Self {
        let registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor);
        }
        registry
    }

    /// Add or replace a method
    pub fn register(&self, descriptor: MethodDescriptor) {
        self.methods
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl SchemaRegistry for StaticSchemaRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<MethodDescriptor>> {
        self.methods.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
