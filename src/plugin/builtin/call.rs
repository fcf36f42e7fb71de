//! `call.start` and `call.result` built-ins

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::BufMut;

use crate::pipeline::buffer::BufferPool;
use crate::pipeline::codes::ApiCode;
use crate::pipeline::error::CallFailure;
use crate::plugin::points::{
    CallDisposition, CallResultInterceptor, CallStartInterceptor, ResultNext, StartNext,
};

/// Refuses calls to blacklisted methods
///
/// The blacklist is swapped atomically when configuration changes; each call
/// sees one consistent snapshot.
#[derive(Debug, Clone)]
pub struct BlacklistGuard {
    blacklist: Arc<ArcSwap<HashSet<String>>>,
}

impl BlacklistGuard {
    pub const KEY: &'static str = "builtin::call::blacklist";

    pub fn new(blacklist: Arc<ArcSwap<HashSet<String>>>) -> Self {
        Self { blacklist }
    }
}

impl CallStartInterceptor for BlacklistGuard {
    fn start(&self, next: &mut StartNext<'_, '_>) -> Result<CallDisposition, CallFailure> {
        let node = next.args().node;
        if self.blacklist.load().contains(node.method_name()) {
            return Err(CallFailure::rejected(
                ApiCode::ACCESS_DENIED,
                format!("method '{}' is not accessible", node.method_name()),
            ));
        }
        next.proceed()
    }
}

/// Terminal stage of `call.start`
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchStage;

impl DispatchStage {
    pub const KEY: &'static str = "builtin::call::dispatch";
}

impl CallStartInterceptor for DispatchStage {
    fn start(&self, _next: &mut StartNext<'_, '_>) -> Result<CallDisposition, CallFailure> {
        Ok(CallDisposition::Dispatch)
    }
}

/// Serializes a call's value as JSON into a pooled buffer
#[derive(Debug, Clone)]
pub struct JsonResultWriter {
    buffers: Arc<BufferPool>,
}

impl JsonResultWriter {
    pub const KEY: &'static str = "builtin::result::json";
    pub const CAPABILITY: &'static str = "call.result.writer";

    pub fn new(buffers: Arc<BufferPool>) -> Self {
        Self { buffers }
    }
}

impl CallResultInterceptor for JsonResultWriter {
    fn receive(&self, next: &mut ResultNext<'_, '_>) -> Result<(), CallFailure> {
        let value = next.args().value;
        let mut buffer = self.buffers.acquire();
        if let Err(err) = serde_json::to_writer((&mut buffer).writer(), value) {
            self.buffers.release(buffer);
            return Err(err.into());
        }

        let scope = next.args_mut();
        scope.buffer = Some(buffer);
        scope.pooled = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use crate::pipeline::node::CallDag;
    use crate::plugin::descriptor::PluginDescriptor;
    use crate::plugin::points::{GatewayPluginsBuilder, ResultScope, StartScope};
    use crate::rpc::MethodDescriptor;
    use serde_json::json;

    fn dag(method: &str) -> CallDag {
        let mut dag = CallDag::new();
        dag.add_call(method, Arc::new(MethodDescriptor::new(method)), vec![]);
        dag
    }

    #[test]
    fn test_blacklist_rejects_and_reloads() {
        let blacklist = Arc::new(ArcSwap::from_pointee(HashSet::from(["admin.drop".to_string()])));
        let mut builder = GatewayPluginsBuilder::new();
        builder
            .call_start(
                PluginDescriptor::new(BlacklistGuard::KEY),
                Arc::new(BlacklistGuard::new(Arc::clone(&blacklist))),
            )
            .call_start(PluginDescriptor::new(DispatchStage::KEY).last(), Arc::new(DispatchStage));
        let plugins = builder.build().unwrap();

        let blocked = dag("admin.drop");
        let scope = StartScope {
            cid: "c",
            node: &blocked.nodes()[0],
        };
        match plugins.start_call(scope) {
            Err(CallFailure::Rejected { code, .. }) => assert_eq!(code, ApiCode::ACCESS_DENIED),
            other => panic!("unexpected: {other:?}"),
        }

        blacklist.store(Arc::new(HashSet::new()));
        let scope = StartScope {
            cid: "c",
            node: &blocked.nodes()[0],
        };
        assert_eq!(plugins.start_call(scope).unwrap(), CallDisposition::Dispatch);
    }

    #[test]
    fn test_json_writer_fills_pooled_buffer() {
        let pool = Arc::new(BufferPool::new(&BufferConfig::default()));
        let mut builder = GatewayPluginsBuilder::new();
        builder.call_result(
            PluginDescriptor::new(JsonResultWriter::KEY).last(),
            Arc::new(JsonResultWriter::new(Arc::clone(&pool))),
        );
        let plugins = builder.build().unwrap();

        let dag = dag("m");
        let value = json!({"id": 7, "tags": ["a"]});
        let (result, scope) = plugins.receive_result(ResultScope {
            cid: "c",
            node: &dag.nodes()[0],
            value: &value,
            buffer: None,
            pooled: false,
        });
        assert!(result.is_ok());
        assert!(scope.pooled);
        let buffer = scope.buffer.unwrap();
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&buffer).unwrap(), value);

        pool.release(buffer);
        assert_eq!(pool.pooled(), 1);
    }
}
