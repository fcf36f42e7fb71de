//! Ordering graph for plugin linearization
//!
//! A small directed graph keyed by plugin identity where an edge `a -> b`
//! means "a runs before b". It is built once per plugin-point at startup and
//! sorted once; it is never mutated concurrently.
//!
//! # Sorting
//!
//! ```text
//! repeat:
//!     pick the earliest-inserted node with no unresolved predecessor
//!     remove its outgoing edges, append it to the result
//! until no nodes remain, or no node is free (cycle: report every open node)
//! ```
//!
//! Scanning in insertion order makes the tie-break deterministic, so the same
//! plugin set always yields the same order.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use thiserror::Error;

/// Errors raised by [`OrderingGraph`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError<K: fmt::Debug> {
    /// An edge referenced a node that was never added
    #[error("Unknown node in ordering graph: {0:?}")]
    UnknownNode(K),

    /// No node is free while nodes remain; carries every unresolved node
    #[error("Ordering cycle detected among: {remaining:?}")]
    Cycle { remaining: Vec<K> },
}

/// Directed graph with deterministic topological ordering
#[derive(Debug, Clone)]
pub struct OrderingGraph<K, D> {
    graph: DiGraph<K, ()>,
    index: HashMap<K, NodeIndex>,
    data: Vec<D>,
}

impl<K, D> OrderingGraph<K, D>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            data: Vec::new(),
        }
    }

    /// Add a node. Returns `false` (and keeps the existing data) if the key is
    /// already present.
    pub fn add_node(&mut self, key: K, data: D) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let idx = self.graph.add_node(key.clone());
        self.index.insert(key, idx);
        self.data.push(data);
        true
    }

    /// Add an edge meaning `from` precedes `to`. Repeated edges collapse.
    pub fn add_edge(&mut self, from: &K, to: &K) -> Result<(), GraphError<K>> {
        let from_idx = self.node_index(from)?;
        let to_idx = self.node_index(to)?;
        self.graph.update_edge(from_idx, to_idx, ());
        Ok(())
    }

    /// Whether a node with this key exists
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Data attached to a node
    pub fn data(&self, key: &K) -> Option<&D> {
        self.index.get(key).map(|idx| &self.data[idx.index()])
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// Compute a topological order of the keys
    pub fn topological_order(&self) -> Result<Vec<K>, GraphError<K>> {
        Ok(self
            .sorted_indices()?
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Consume the graph, returning `(key, data)` pairs in topological order
    pub fn into_ordered(self) -> Result<Vec<(K, D)>, GraphError<K>> {
        let order = self.sorted_indices()?;
        let mut slots: Vec<Option<D>> = self.data.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(order.len());
        for idx in order {
            if let Some(data) = slots[idx.index()].take() {
                ordered.push((self.graph[idx].clone(), data));
            }
        }
        Ok(ordered)
    }

    /// A copy of this graph with every edge reversed
    pub fn reverse(&self) -> Self
    where
        D: Clone,
    {
        let mut graph = self.graph.clone();
        graph.reverse();
        Self {
            graph,
            index: self.index.clone(),
            data: self.data.clone(),
        }
    }

    /// Every node reachable from `start` by following edges forward,
    /// in depth-first discovery order (excluding `start`)
    pub fn reachable_from(&self, start: &K) -> Result<Vec<K>, GraphError<K>> {
        let start_idx = self.node_index(start)?;
        let mut dfs = Dfs::new(&self.graph, start_idx);
        let mut found = Vec::new();
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start_idx {
                found.push(self.graph[idx].clone());
            }
        }
        Ok(found)
    }

    /// Every node that can reach `target` (its transitive predecessors),
    /// in depth-first discovery order (excluding `target`)
    pub fn reaching(&self, target: &K) -> Result<Vec<K>, GraphError<K>> {
        let target_idx = self.node_index(target)?;
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, target_idx);
        let mut found = Vec::new();
        while let Some(idx) = dfs.next(reversed) {
            if idx != target_idx {
                found.push(self.graph[idx].clone());
            }
        }
        Ok(found)
    }

    fn node_index(&self, key: &K) -> Result<NodeIndex, GraphError<K>> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(key.clone()))
    }

    fn sorted_indices(&self) -> Result<Vec<NodeIndex>, GraphError<K>> {
        let count = self.graph.node_count();
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut emitted = vec![false; count];
        let mut order = Vec::with_capacity(count);

        while order.len() < count {
            let free = self
                .graph
                .node_indices()
                .find(|idx| !emitted[idx.index()] && in_degree[idx.index()] == 0);

            let Some(idx) = free else {
                let remaining = self
                    .graph
                    .node_indices()
                    .filter(|idx| !emitted[idx.index()])
                    .map(|idx| self.graph[idx].clone())
                    .collect();
                return Err(GraphError::Cycle { remaining });
            };

            emitted[idx.index()] = true;
            for succ in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[succ.index()] = in_degree[succ.index()].saturating_sub(1);
            }
            order.push(idx);
        }

        Ok(order)
    }
}

impl<K, D> Default for OrderingGraph<K, D>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
