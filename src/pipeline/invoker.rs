//! Call invocation
//!
//! Turns one ready [`CallNode`] into an RPC through the transport and
//! normalizes both reply shapes into an [`ExecutionOutcome`]. Metadata keys
//! that belong to transport plumbing are filtered on both paths.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument, Span, debug};

use super::error::CallFailure;
use super::metadata::CallMetadata;
use super::node::CallNode;
use crate::plugin::isolation::{call_plugin_preserving_error, catch_unwind_future};
use crate::rpc::{
    Completion, PendingCall, RpcError, RpcReply, RpcRequest, RpcTransport, UpstreamResult,
};

/// What became of one invocation
pub enum ExecutionOutcome {
    Success {
        value: Value,
        metadata: CallMetadata,
    },
    /// Metadata written before the failure is kept for the response
    Failure {
        cause: CallFailure,
        metadata: CallMetadata,
    },
    /// The transport answered asynchronously; drive with [`CallInvoker::complete`]
    Pending(PendingCall),
}

impl std::fmt::Debug for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { value, metadata } => f
                .debug_struct("Success")
                .field("value", value)
                .field("metadata", metadata)
                .finish(),
            Self::Failure { cause, metadata } => f
                .debug_struct("Failure")
                .field("cause", cause)
                .field("metadata", metadata)
                .finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

pub struct CallInvoker {
    transport: Arc<dyn RpcTransport>,
    filtered_keys: Arc<[String]>,
}

impl CallInvoker {
    pub fn new(transport: Arc<dyn RpcTransport>, filtered_keys: Vec<String>) -> Self {
        Self {
            transport,
            filtered_keys: filtered_keys.into(),
        }
    }

    /// Invoke the backend for `node`
    ///
    /// The per-call metadata store lives only for this invocation, so nothing
    /// leaks into the next call.
    pub fn invoke(
        &self,
        cid: &str,
        node: &CallNode,
        upstream: Vec<UpstreamResult>,
    ) -> ExecutionOutcome {
        let request = RpcRequest {
            cid: cid.to_string(),
            method: Arc::clone(node.method()),
            args: node.params().to_vec(),
            upstream,
        };
        let mut store = CallMetadata::default();

        let reply = call_plugin_preserving_error(
            AssertUnwindSafe(|| self.transport.invoke(request, &mut store)),
            |message| RpcError::transport(format!("backend panicked: {message}")),
        );
        match reply {
            Ok(RpcReply::Ready(value)) => ExecutionOutcome::Success {
                value,
                metadata: store.without_keys(&self.filtered_keys[..]),
            },
            Ok(RpcReply::Pending(pending)) => ExecutionOutcome::Pending(pending),
            Err(err) => ExecutionOutcome::Failure {
                cause: CallFailure::Execution(err),
                metadata: store.without_keys(&self.filtered_keys[..]),
            },
        }
    }

    /// Drive a pending call to its outcome inside the request's span
    pub fn complete(
        &self,
        pending: PendingCall,
        span: Span,
    ) -> impl Future<Output = ExecutionOutcome> + Send + 'static {
        let filtered_keys = Arc::clone(&self.filtered_keys);
        async move {
            let completion = catch_unwind_future(pending)
                .await
                .unwrap_or_else(|message| {
                    Completion::err(RpcError::transport(format!(
                        "backend panicked: {message}"
                    )))
                });
            debug!(ok = completion.result.is_ok(), "Asynchronous call completed");
            let metadata = completion.metadata.without_keys(&filtered_keys[..]);
            match completion.result {
                Ok(value) => ExecutionOutcome::Success { value, metadata },
                Err(err) => ExecutionOutcome::Failure {
                    cause: CallFailure::Execution(err),
                    metadata,
                },
            }
        }
        .instrument(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::node::CallDag;
    use crate::rpc::{LocalTransport, MethodDescriptor};
    use serde_json::json;

    fn invoker(transport: LocalTransport) -> CallInvoker {
        CallInvoker::new(Arc::new(transport), vec!["rpc.trace_id".to_string()])
    }

    fn dag(method: &str) -> CallDag {
        let mut dag = CallDag::new();
        dag.add_call(method, Arc::new(MethodDescriptor::new(method)), vec![]);
        dag
    }

    #[test]
    fn test_sync_success_filters_metadata() {
        let transport = LocalTransport::new();
        transport.register_sync("m", |_, metadata| {
            metadata.insert("rpc.trace_id", "abc");
            metadata.insert("region", "eu");
            Ok(json!(1))
        });
        let dag = dag("m");
        match invoker(transport).invoke("cid", &dag.nodes()[0], vec![]) {
            ExecutionOutcome::Success { value, metadata } => {
                assert_eq!(value, json!(1));
                assert_eq!(metadata.get("region"), Some("eu"));
                assert_eq!(metadata.get("rpc.trace_id"), None);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_sync_failure() {
        let transport = LocalTransport::new();
        transport.register_sync("m", |_, _| Err(RpcError::status(404, "missing")));
        let dag = dag("m");
        match invoker(transport).invoke("cid", &dag.nodes()[0], vec![]) {
            ExecutionOutcome::Failure {
                cause: CallFailure::Execution(RpcError::Status { code, .. }),
                ..
            } => assert_eq!(code, 404),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_sync_failure_keeps_filtered_metadata() {
        let transport = LocalTransport::new();
        transport.register_sync("m", |_, metadata| {
            metadata.insert("rpc.trace_id", "abc");
            metadata.insert("region", "eu");
            Err(RpcError::status(503, "down"))
        });
        let dag = dag("m");
        match invoker(transport).invoke("cid", &dag.nodes()[0], vec![]) {
            ExecutionOutcome::Failure { metadata, .. } => {
                assert_eq!(metadata.get("region"), Some("eu"));
                assert_eq!(metadata.get("rpc.trace_id"), None);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_sync_panic_becomes_failure() {
        let transport = LocalTransport::new();
        transport.register_sync("m", |_, _| -> Result<serde_json::Value, RpcError> {
            panic!("backend bug")
        });
        let dag = dag("m");
        assert!(matches!(
            invoker(transport).invoke("cid", &dag.nodes()[0], vec![]),
            ExecutionOutcome::Failure {
                cause: CallFailure::Execution(RpcError::Transport(_)),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pending_completion_filters_metadata() {
        let transport = LocalTransport::new();
        transport.register_async("m", |_req: RpcRequest| async {
            let metadata = CallMetadata::from_iter([("rpc.trace_id", "x"), ("k", "v")]);
            Completion::ok(json!("late")).with_metadata(metadata)
        });
        let invoker = invoker(transport);
        let dag = dag("m");
        let ExecutionOutcome::Pending(pending) = invoker.invoke("cid", &dag.nodes()[0], vec![])
        else {
            panic!("expected pending");
        };
        match invoker.complete(pending, Span::none()).await {
            ExecutionOutcome::Success { value, metadata } => {
                assert_eq!(value, json!("late"));
                assert_eq!(metadata.len(), 1);
                assert_eq!(metadata.get("k"), Some("v"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_completion_keeps_filtered_metadata() {
        let transport = LocalTransport::new();
        transport.register_async("m", |_req: RpcRequest| async {
            let metadata = CallMetadata::from_iter([("rpc.trace_id", "x"), ("k", "v")]);
            Completion::err(RpcError::status(500, "boom")).with_metadata(metadata)
        });
        let invoker = invoker(transport);
        let dag = dag("m");
        let ExecutionOutcome::Pending(pending) = invoker.invoke("cid", &dag.nodes()[0], vec![])
        else {
            panic!("expected pending");
        };
        match invoker.complete(pending, Span::none()).await {
            ExecutionOutcome::Failure { metadata, .. } => {
                assert_eq!(metadata.len(), 1);
                assert_eq!(metadata.get("k"), Some("v"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_completion_becomes_failure() {
        let transport = LocalTransport::new();
        transport.register_async("m", |_req: RpcRequest| async {
            if true {
                panic!("backend bug");
            }
            Completion::ok(json!(null))
        });
        let invoker = invoker(transport);
        let dag = dag("m");
        let ExecutionOutcome::Pending(pending) = invoker.invoke("cid", &dag.nodes()[0], vec![])
        else {
            panic!("expected pending");
        };
        assert!(matches!(
            invoker.complete(pending, Span::none()).await,
            ExecutionOutcome::Failure {
                cause: CallFailure::Execution(RpcError::Transport(_)),
                ..
            }
        ));
    }
}
