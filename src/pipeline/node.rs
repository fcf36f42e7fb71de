//! Call nodes and the per-request call graph

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use serde::Serialize;
use serde_json::Value;

use super::codes::CallState;
use super::error::CallFailure;
use crate::rpc::MethodDescriptor;

/// Index of a node within its [`CallDag`]
pub type ExecutionId = usize;

/// Lifecycle of one call. Every node reaches `Finished` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Started,
    ResultReceived,
    Finished,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallTiming {
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl CallTiming {
    /// Time between start and finish; zero for calls that never started
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }
}

/// One requested invocation
#[derive(Debug)]
pub struct CallNode {
    id: ExecutionId,
    key: String,
    method: Arc<MethodDescriptor>,
    params: Vec<Option<String>>,
    prev: Vec<ExecutionId>,
    pub(crate) state: NodeState,
    pub(crate) value: Option<Value>,
    pub(crate) failure: Option<CallFailure>,
    pub(crate) buffer: Option<BytesMut>,
    /// Buffer came from the pool and must be handed back
    pub(crate) from_client: bool,
    pub(crate) timing: CallTiming,
    pub(crate) call_state: Option<CallState>,
}

impl CallNode {
    fn new(
        id: ExecutionId,
        key: String,
        method: Arc<MethodDescriptor>,
        params: Vec<Option<String>>,
    ) -> Self {
        Self {
            id,
            key,
            method,
            params,
            prev: Vec::new(),
            state: NodeState::Pending,
            value: None,
            failure: None,
            buffer: None,
            from_client: false,
            timing: CallTiming::default(),
            call_state: None,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// `name@alias`, or the bare method name when no alias was given
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    pub fn params(&self) -> &[Option<String>] {
        &self.params
    }

    /// Predecessors, in declaration order
    pub fn prev(&self) -> &[ExecutionId] {
        &self.prev
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        self.failure.as_ref()
    }

    /// Serialized result, once written
    pub fn result_bytes(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    pub fn timing(&self) -> &CallTiming {
        &self.timing
    }

    /// Client-facing state assigned by the `call.finished` chain
    pub fn call_state(&self) -> Option<&CallState> {
        self.call_state.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.state == NodeState::Finished
    }
}

/// Calls of one request and their dependencies
#[derive(Debug, Default)]
pub struct CallDag {
    nodes: Vec<CallNode>,
    top_level: Vec<ExecutionId>,
}

impl CallDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a call whose result is part of the response
    pub fn add_call(
        &mut self,
        key: impl Into<String>,
        method: Arc<MethodDescriptor>,
        params: Vec<Option<String>>,
    ) -> ExecutionId {
        let id = self.add_internal_call(key, method, params);
        self.top_level.push(id);
        id
    }

    /// Add a call that only runs when a response call depends on it
    pub fn add_internal_call(
        &mut self,
        key: impl Into<String>,
        method: Arc<MethodDescriptor>,
        params: Vec<Option<String>>,
    ) -> ExecutionId {
        let id = self.nodes.len();
        self.nodes.push(CallNode::new(id, key.into(), method, params));
        id
    }

    /// Make `node` wait for `prev`. Returns false if either id is unknown.
    pub fn add_dependency(&mut self, node: ExecutionId, prev: ExecutionId) -> bool {
        if prev >= self.nodes.len() {
            return false;
        }
        match self.nodes.get_mut(node) {
            Some(n) => {
                if !n.prev.contains(&prev) {
                    n.prev.push(prev);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ExecutionId) -> Option<&CallNode> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: ExecutionId) -> Option<&mut CallNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> &[CallNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [CallNode] {
        &mut self.nodes
    }

    /// Response calls, in request order
    pub fn top_level(&self) -> &[ExecutionId] {
        &self.top_level
    }

    pub fn find(&self, key: &str) -> Option<&CallNode> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// Every node reachable from the response calls through `prev`, each
    /// once, in id order
    pub fn execution_set(&self) -> Vec<ExecutionId> {
        let mut member = vec![false; self.nodes.len()];
        let mut stack: Vec<ExecutionId> = self.top_level.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if member[id] {
                continue;
            }
            member[id] = true;
            stack.extend(self.nodes[id].prev.iter().rev().copied());
        }
        member
            .iter()
            .enumerate()
            .filter_map(|(id, m)| m.then_some(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str) -> Arc<MethodDescriptor> {
        Arc::new(MethodDescriptor::new(name))
    }

    #[test]
    fn test_execution_set_follows_prev() {
        let mut dag = CallDag::new();
        let hidden = dag.add_internal_call("auth.token", method("auth.token"), vec![]);
        let unused = dag.add_internal_call("unused", method("unused"), vec![]);
        let a = dag.add_call("a", method("a"), vec![]);
        let b = dag.add_call("b", method("b"), vec![]);
        assert!(dag.add_dependency(a, hidden));
        assert!(dag.add_dependency(b, a));

        assert_eq!(dag.execution_set(), vec![hidden, a, b]);
        assert!(!dag.execution_set().contains(&unused));
        assert_eq!(dag.top_level(), &[a, b]);
    }

    #[test]
    fn test_execution_set_handles_cycles() {
        let mut dag = CallDag::new();
        let a = dag.add_call("a", method("a"), vec![]);
        let b = dag.add_call("b", method("b"), vec![]);
        dag.add_dependency(a, b);
        dag.add_dependency(b, a);
        assert_eq!(dag.execution_set(), vec![a, b]);
    }

    #[test]
    fn test_add_dependency_rejects_unknown_ids() {
        let mut dag = CallDag::new();
        let a = dag.add_call("a", method("a"), vec![]);
        assert!(!dag.add_dependency(a, 7));
        assert!(!dag.add_dependency(7, a));
        assert!(dag.add_dependency(a, a));
        assert!(dag.add_dependency(a, a));
        assert_eq!(dag.node(a).unwrap().prev(), &[a]);
    }

    #[test]
    fn test_new_node_is_pending() {
        let mut dag = CallDag::new();
        let a = dag.add_call("user.get@me", method("user.get"), vec![Some("1".into())]);
        let node = dag.node(a).unwrap();
        assert_eq!(node.state(), NodeState::Pending);
        assert_eq!(node.key(), "user.get@me");
        assert_eq!(node.method_name(), "user.get");
        assert_eq!(node.timing().elapsed(), Duration::ZERO);
        assert!(node.result_bytes().is_none());
    }
}
