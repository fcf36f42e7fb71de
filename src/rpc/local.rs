//! In-process transport
//!
//! Methods are plain closures registered by name. Synchronous handlers answer
//! inline; asynchronous handlers return a pending completion that the
//! scheduler drives on a spawned task.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value, json};

use super::schema::{MethodDescriptor, ParamSpec};
use super::transport::{Completion, RpcError, RpcReply, RpcRequest, RpcTransport};
use crate::pipeline::metadata::{CallMetadata, SERVICE_LOG_KEY};

type SyncHandler =
    Arc<dyn Fn(&RpcRequest, &mut CallMetadata) -> Result<Value, RpcError> + Send + Sync>;

/// An asynchronously answered local method
#[async_trait]
pub trait AsyncMethod: Send + Sync {
    async fn call(&self, request: RpcRequest) -> Completion;
}

#[async_trait]
impl<F, Fut> AsyncMethod for F
where
    F: Fn(RpcRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Completion> + Send + 'static,
{
    async fn call(&self, request: RpcRequest) -> Completion {
        (self)(request).await
    }
}

#[derive(Clone)]
enum LocalMethod {
    Sync(SyncHandler),
    Async(Arc<dyn AsyncMethod>),
}

/// Transport dispatching to in-process handlers
#[derive(Default)]
pub struct LocalTransport {
    methods: DashMap<String, LocalMethod>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a method answered inline
    pub fn register_sync<F>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&RpcRequest, &mut CallMetadata) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), LocalMethod::Sync(Arc::new(handler)));
        self
    }

    /// Bind a method answered through a pending completion
    pub fn register_async<M>(&self, name: impl Into<String>, method: M) -> &Self
    where
        M: AsyncMethod + 'static,
    {
        self.methods.insert(name.into(), LocalMethod::Async(Arc::new(method)));
        self
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Transport carrying the `sys.echo` and `sys.time` demo methods
    pub fn with_demo_methods() -> Self {
        let transport = Self::new();
        transport.register_sync("sys.echo", |request, metadata| {
            let upstream: Map<String, Value> = request
                .upstream
                .iter()
                .map(|u| (u.key.clone(), u.value.clone()))
                .collect();
            metadata.insert(SERVICE_LOG_KEY, format!("echo:{}", request.cid));
            Ok(json!({
                "message": request.arg("message"),
                "upstream": upstream,
            }))
        });
        transport.register_async("sys.time", |_request: RpcRequest| async move {
            let epoch_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default();
            Completion::ok(json!({ "epoch_ms": epoch_ms }))
        });
        transport
    }

    /// Schema entries matching [`LocalTransport::with_demo_methods`]
    pub fn demo_schema() -> Vec<MethodDescriptor> {
        vec![
            MethodDescriptor::new("sys.echo").with_param(ParamSpec::optional("message")),
            MethodDescriptor::new("sys.time"),
        ]
    }
}

impl RpcTransport for LocalTransport {
    fn invoke(
        &self,
        request: RpcRequest,
        metadata: &mut CallMetadata,
    ) -> Result<RpcReply, RpcError> {
        let method = self
            .methods
            .get(&request.method.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                RpcError::transport(format!("no local handler bound for '{}'", request.method.name))
            })?;

        match method {
            LocalMethod::Sync(handler) => handler(&request, metadata).map(RpcReply::Ready),
            LocalMethod::Async(method) => Ok(RpcReply::Pending(Box::pin(async move {
                method.call(request).await
            }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::transport::UpstreamResult;

    fn request(method: MethodDescriptor, args: Vec<Option<String>>) -> RpcRequest {
        RpcRequest {
            cid: "test-cid".into(),
            method: Arc::new(method),
            args,
            upstream: Vec::new(),
        }
    }

    #[test]
    fn test_sync_method_answers_inline() {
        let transport = LocalTransport::with_demo_methods();
        let mut metadata = CallMetadata::default();
        let mut req = request(
            MethodDescriptor::new("sys.echo").with_param(ParamSpec::optional("message")),
            vec![Some("hi".into())],
        );
        req.upstream.push(UpstreamResult {
            key: "prev".into(),
            value: json!(1),
        });

        match transport.invoke(req, &mut metadata).unwrap() {
            RpcReply::Ready(value) => {
                assert_eq!(value["message"], "hi");
                assert_eq!(value["upstream"]["prev"], 1);
            }
            RpcReply::Pending(_) => panic!("expected inline reply"),
        }
        assert_eq!(metadata.get(SERVICE_LOG_KEY), Some("echo:test-cid"));
    }

    #[tokio::test]
    async fn test_async_method_returns_pending() {
        let transport = LocalTransport::with_demo_methods();
        let mut metadata = CallMetadata::default();
        let reply = transport
            .invoke(request(MethodDescriptor::new("sys.time"), vec![]), &mut metadata)
            .unwrap();
        let RpcReply::Pending(pending) = reply else {
            panic!("expected pending reply");
        };
        let completion = pending.await;
        assert!(completion.result.unwrap()["epoch_ms"].as_u64().unwrap() > 0);
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_unbound_method_is_transport_error() {
        let transport = LocalTransport::new();
        let mut metadata = CallMetadata::default();
        let err = transport
            .invoke(request(MethodDescriptor::new("nope"), vec![]), &mut metadata)
            .unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }
}
