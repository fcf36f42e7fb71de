//! Multi-call request pipeline
//!
//! One HTTP request names several backend calls with data dependencies
//! between them. The pipeline turns it into one JSON response:
//!
//! ```text
//!  params --> request.verify --> CallDag --> WorkflowScheduler --> request.finished --> response
//!             (limit, parse)                  |  per call:
//!                                             |  call.start -> CallInvoker -> call.result
//!                                             |  -> call.finished
//! ```
//!
//! Request-level failures skip the scheduler entirely and go straight to
//! `request.finished` with every call result suppressed. Call-level failures
//! only affect the failing call and, transitively, its dependents.

pub mod buffer;
pub mod codes;
pub mod context;
pub mod envelope;
pub mod error;
pub mod invoker;
pub mod metadata;
pub mod metrics;
pub mod node;
pub mod parser;
pub mod scheduler;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

pub use codes::{ApiCode, CallState};
pub use context::PipelineContext;
pub use envelope::GatewayResponse;
pub use error::{CallFailure, GatewayError, GatewayResult, RequestParseError};
pub use invoker::{CallInvoker, ExecutionOutcome};
pub use metadata::{CallMetadata, SERVICE_LOG_KEY};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use node::{CallDag, CallNode, ExecutionId, NodeState};
pub use parser::{CallGraphParser, MULTI_CALL_PARAM};
pub use scheduler::WorkflowScheduler;

use crate::config::{BufferConfig, PipelineConfig, ServerConfig};
use crate::plugin::builtin::BuiltinEnv;
use crate::plugin::points::{GatewayPlugins, GatewayPluginsBuilder, REQUEST_VERIFY, RequestScope};
use crate::plugin::{ChainError, ConfigurationError};
use crate::rpc::{RpcTransport, SchemaRegistry};
use buffer::BufferPool;

/// The assembled request pipeline
pub struct Gateway {
    plugins: Arc<GatewayPlugins>,
    scheduler: WorkflowScheduler,
    schema: Arc<dyn SchemaRegistry>,
    blacklist: Arc<ArcSwap<HashSet<String>>>,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    pub fn builder(
        transport: Arc<dyn RpcTransport>,
        schema: Arc<dyn SchemaRegistry>,
    ) -> GatewayBuilder {
        GatewayBuilder::new(transport, schema)
    }

    /// Serve one multi-call request
    pub async fn handle(
        &self,
        cid: impl Into<String>,
        params: HashMap<String, String>,
    ) -> GatewayResponse {
        let mut ctx = PipelineContext::new(cid, params, Arc::clone(&self.schema));

        let (verified, dag) = {
            let _entered = ctx.span().enter();
            let (result, scope) = self
                .plugins
                .verify_request(RequestScope { ctx: &ctx, dag: None });
            (result, scope.dag)
        };

        match (verified, dag) {
            (Ok(()), Some(mut dag)) => self.scheduler.execute(&mut ctx, &mut dag).await,
            (Ok(()), None) => {
                let origin = GatewayError::Chain(ChainError::Unterminated {
                    point: REQUEST_VERIFY,
                });
                self.scheduler.reject(&ctx, &origin)
            }
            (Err(origin), _) => self.scheduler.reject(&ctx, &origin),
        }
    }

    /// Replace the method blacklist; in-flight calls keep the old snapshot
    pub fn update_blacklist(&self, methods: impl IntoIterator<Item = String>) {
        let blacklist: HashSet<String> = methods.into_iter().collect();
        info!(methods = blacklist.len(), "Method blacklist updated");
        self.blacklist.store(Arc::new(blacklist));
    }

    pub fn blacklist(&self) -> Arc<HashSet<String>> {
        self.blacklist.load_full()
    }

    pub fn plugins(&self) -> &GatewayPlugins {
        &self.plugins
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn schema(&self) -> &Arc<dyn SchemaRegistry> {
        &self.schema
    }
}

type PluginCustomizer = Box<dyn FnOnce(&mut GatewayPluginsBuilder)>;

/// Assembles a [`Gateway`]; plugin resolution happens in [`GatewayBuilder::build`]
pub struct GatewayBuilder {
    transport: Arc<dyn RpcTransport>,
    schema: Arc<dyn SchemaRegistry>,
    pipeline: PipelineConfig,
    buffers: BufferConfig,
    blacklist: HashSet<String>,
    customizers: Vec<PluginCustomizer>,
}

impl GatewayBuilder {
    pub fn new(transport: Arc<dyn RpcTransport>, schema: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            transport,
            schema,
            pipeline: PipelineConfig::default(),
            buffers: BufferConfig::default(),
            blacklist: HashSet::new(),
            customizers: Vec::new(),
        }
    }

    /// Take pipeline, buffer and access settings from `config`
    pub fn config(mut self, config: &ServerConfig) -> Self {
        self.pipeline = config.pipeline.clone();
        self.buffers = config.buffers;
        self.blacklist = config.access.blacklist.clone();
        self
    }

    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn buffers(mut self, buffers: BufferConfig) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn blacklist(mut self, methods: impl IntoIterator<Item = String>) -> Self {
        self.blacklist = methods.into_iter().collect();
        self
    }

    /// Register additional plugins next to the built-ins
    pub fn plugins(mut self, customize: impl FnOnce(&mut GatewayPluginsBuilder) + 'static) -> Self {
        self.customizers.push(Box::new(customize));
        self
    }

    pub fn build(self) -> Result<Gateway, ConfigurationError> {
        let blacklist = Arc::new(ArcSwap::from_pointee(self.blacklist));
        let buffers = Arc::new(BufferPool::new(&self.buffers));
        let env = BuiltinEnv::new(
            self.pipeline.clone(),
            Arc::clone(&blacklist),
            Arc::clone(&buffers),
        );

        let mut builder = GatewayPluginsBuilder::with_builtins(&env);
        for customize in self.customizers {
            customize(&mut builder);
        }
        let plugins = Arc::new(builder.build()?);
        for summary in plugins.describe() {
            info!(
                point = summary.point,
                plugins = summary.plugins.len(),
                "Plugin-point resolved"
            );
        }

        let metrics = Arc::new(GatewayMetrics::new());
        let invoker = CallInvoker::new(
            self.transport,
            self.pipeline.filtered_metadata_keys.clone(),
        );
        let scheduler = WorkflowScheduler::new(
            Arc::clone(&plugins),
            invoker,
            buffers,
            Arc::clone(&metrics),
            self.pipeline.request_timeout(),
        );

        Ok(Gateway {
            plugins,
            scheduler,
            schema: self.schema,
            blacklist,
            metrics,
        })
    }
}
