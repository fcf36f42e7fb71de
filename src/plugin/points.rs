//! Plugin-points of the multi-call pipeline
//!
//! | Point              | Trait                     | Runs                                   |
//! |--------------------|---------------------------|----------------------------------------|
//! | `request.verify`   | [`RequestInterceptor`]    | once per request, builds the call graph |
//! | `call.start`       | [`CallStartInterceptor`]  | per call, decides dispatch              |
//! | `call.result`      | [`CallResultInterceptor`] | per successful call, serializes it      |
//! | `call.finished`    | [`CallFinishedInterceptor`] | exactly once per call, assigns state  |
//! | `request.finished` | [`ResponseInterceptor`]   | once per request, writes the response   |
//!
//! Each point resolves into an [`InterceptorChain`] at startup. Resolution
//! failures are fatal.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;
use serde_json::Value;

use super::builtin::{self, BuiltinEnv};
use super::chain::{InterceptorChain, Next};
use super::descriptor::PluginDescriptor;
use super::registry::{ConfigurationError, PluginRegistry};
use crate::pipeline::codes::CallState;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::envelope::GatewayResponse;
use crate::pipeline::error::{CallFailure, GatewayError, GatewayResult};
use crate::pipeline::node::{CallDag, CallNode};

pub const REQUEST_VERIFY: &str = "request.verify";
pub const CALL_START: &str = "call.start";
pub const CALL_RESULT: &str = "call.result";
pub const CALL_FINISHED: &str = "call.finished";
pub const REQUEST_FINISHED: &str = "request.finished";

// ============================================================================
// request.verify
// ============================================================================

pub struct RequestScope<'r> {
    pub ctx: &'r PipelineContext,
    /// Set by the terminal plugin once the call specification is parsed
    pub dag: Option<CallDag>,
}

pub type RequestNext<'c, 'r> = Next<'c, dyn RequestInterceptor, RequestScope<'r>, (), GatewayError>;

pub trait RequestInterceptor: Send + Sync {
    fn verify(&self, next: &mut RequestNext<'_, '_>) -> GatewayResult<()>;
}

// ============================================================================
// call.start
// ============================================================================

/// What the scheduler should do with a started call
#[derive(Debug, Clone, PartialEq)]
pub enum CallDisposition {
    /// Invoke the backend
    Dispatch,
    /// Use this value as the call's result without invoking the backend
    Resolved(Value),
}

pub struct StartScope<'r> {
    pub cid: &'r str,
    pub node: &'r CallNode,
}

pub type StartNext<'c, 'r> =
    Next<'c, dyn CallStartInterceptor, StartScope<'r>, CallDisposition, CallFailure>;

pub trait CallStartInterceptor: Send + Sync {
    fn start(&self, next: &mut StartNext<'_, '_>) -> Result<CallDisposition, CallFailure>;
}

// ============================================================================
// call.result
// ============================================================================

pub struct ResultScope<'r> {
    pub cid: &'r str,
    pub node: &'r CallNode,
    pub value: &'r Value,
    /// Serialized result, spliced verbatim into the response
    pub buffer: Option<BytesMut>,
    /// The buffer was taken from the gateway's pool
    pub pooled: bool,
}

pub type ResultNext<'c, 'r> = Next<'c, dyn CallResultInterceptor, ResultScope<'r>, (), CallFailure>;

pub trait CallResultInterceptor: Send + Sync {
    fn receive(&self, next: &mut ResultNext<'_, '_>) -> Result<(), CallFailure>;
}

// ============================================================================
// call.finished
// ============================================================================

pub struct FinishScope<'r> {
    pub cid: &'r str,
    pub node: &'r CallNode,
    pub failure: Option<&'r CallFailure>,
    pub elapsed: Duration,
}

impl FinishScope<'_> {
    /// The call never ran because a predecessor failed
    pub fn is_inherited(&self) -> bool {
        self.failure.is_some_and(CallFailure::is_inherited)
    }
}

pub type FinishNext<'c, 'r> =
    Next<'c, dyn CallFinishedInterceptor, FinishScope<'r>, CallState, CallFailure>;

pub trait CallFinishedInterceptor: Send + Sync {
    fn finish(&self, next: &mut FinishNext<'_, '_>) -> Result<CallState, CallFailure>;
}

// ============================================================================
// request.finished
// ============================================================================

pub struct ResponseScope<'r> {
    pub ctx: &'r PipelineContext,
    /// Absent when the request failed before a call graph existed
    pub dag: Option<&'r CallDag>,
    /// Request-level failure; suppresses every call result
    pub origin: Option<&'r GatewayError>,
}

impl<'r> ResponseScope<'r> {
    /// Nodes that finished with a failure, in id order
    pub fn node_failures(&self) -> Vec<(&'r CallNode, &'r CallFailure)> {
        self.dag
            .map(|dag| {
                dag.nodes()
                    .iter()
                    .filter_map(|node| node.failure().map(|f| (node, f)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Result value of a call by key
    pub fn result(&self, key: &str) -> Option<&'r Value> {
        self.dag.and_then(|dag| dag.find(key)).and_then(CallNode::value)
    }
}

pub type ResponseNext<'c, 'r> =
    Next<'c, dyn ResponseInterceptor, ResponseScope<'r>, GatewayResponse, GatewayError>;

pub trait ResponseInterceptor: Send + Sync {
    fn respond(&self, next: &mut ResponseNext<'_, '_>) -> GatewayResult<GatewayResponse>;
}

// ============================================================================
// Resolved plugin set
// ============================================================================

fn dispatch_verify(
    plugin: &dyn RequestInterceptor,
    next: &mut RequestNext<'_, '_>,
) -> GatewayResult<()> {
    plugin.verify(next)
}

fn dispatch_start(
    plugin: &dyn CallStartInterceptor,
    next: &mut StartNext<'_, '_>,
) -> Result<CallDisposition, CallFailure> {
    plugin.start(next)
}

fn dispatch_result(
    plugin: &dyn CallResultInterceptor,
    next: &mut ResultNext<'_, '_>,
) -> Result<(), CallFailure> {
    plugin.receive(next)
}

fn dispatch_finish(
    plugin: &dyn CallFinishedInterceptor,
    next: &mut FinishNext<'_, '_>,
) -> Result<CallState, CallFailure> {
    plugin.finish(next)
}

fn dispatch_respond(
    plugin: &dyn ResponseInterceptor,
    next: &mut ResponseNext<'_, '_>,
) -> GatewayResult<GatewayResponse> {
    plugin.respond(next)
}

/// Resolved order of one plugin-point, for introspection
#[derive(Debug, Clone, Serialize)]
pub struct PluginPointSummary {
    pub point: &'static str,
    pub plugins: Vec<PluginDescriptor>,
}

/// Every plugin-point's chain, resolved once at startup
pub struct GatewayPlugins {
    request: InterceptorChain<dyn RequestInterceptor>,
    call_start: InterceptorChain<dyn CallStartInterceptor>,
    call_result: InterceptorChain<dyn CallResultInterceptor>,
    call_finished: InterceptorChain<dyn CallFinishedInterceptor>,
    response: InterceptorChain<dyn ResponseInterceptor>,
}

impl GatewayPlugins {
    pub fn builder() -> GatewayPluginsBuilder {
        GatewayPluginsBuilder::new()
    }

    /// Run `request.verify`; the returned scope carries the parsed graph
    pub fn verify_request<'r>(
        &self,
        scope: RequestScope<'r>,
    ) -> (GatewayResult<()>, RequestScope<'r>) {
        self.request.invoke(scope, dispatch_verify)
    }

    pub fn start_call(&self, scope: StartScope<'_>) -> Result<CallDisposition, CallFailure> {
        self.call_start.invoke(scope, dispatch_start).0
    }

    /// Run `call.result`; the returned scope carries the written buffer
    pub fn receive_result<'r>(
        &self,
        scope: ResultScope<'r>,
    ) -> (Result<(), CallFailure>, ResultScope<'r>) {
        self.call_result.invoke(scope, dispatch_result)
    }

    pub fn finish_call(&self, scope: FinishScope<'_>) -> Result<CallState, CallFailure> {
        self.call_finished.invoke(scope, dispatch_finish).0
    }

    pub fn finish_request(&self, scope: ResponseScope<'_>) -> GatewayResult<GatewayResponse> {
        self.response.invoke(scope, dispatch_respond).0
    }

    /// Resolved order of every point
    pub fn describe(&self) -> Vec<PluginPointSummary> {
        fn summary<P: ?Sized>(chain: &InterceptorChain<P>) -> PluginPointSummary {
            PluginPointSummary {
                point: chain.plugins().point(),
                plugins: chain.plugins().descriptors().cloned().collect(),
            }
        }
        vec![
            summary(&self.request),
            summary(&self.call_start),
            summary(&self.call_result),
            summary(&self.call_finished),
            summary(&self.response),
        ]
    }
}

impl std::fmt::Debug for GatewayPlugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayPlugins")
            .field("request", &self.request)
            .field("call_start", &self.call_start)
            .field("call_result", &self.call_result)
            .field("call_finished", &self.call_finished)
            .field("response", &self.response)
            .finish()
    }
}

/// Collects plugins per point before resolution
pub struct GatewayPluginsBuilder {
    request: PluginRegistry<dyn RequestInterceptor>,
    call_start: PluginRegistry<dyn CallStartInterceptor>,
    call_result: PluginRegistry<dyn CallResultInterceptor>,
    call_finished: PluginRegistry<dyn CallFinishedInterceptor>,
    response: PluginRegistry<dyn ResponseInterceptor>,
}

impl GatewayPluginsBuilder {
    /// A builder with no plugins at all
    pub fn new() -> Self {
        Self {
            request: PluginRegistry::new(REQUEST_VERIFY),
            call_start: PluginRegistry::new(CALL_START),
            call_result: PluginRegistry::new(CALL_RESULT),
            call_finished: PluginRegistry::new(CALL_FINISHED),
            response: PluginRegistry::new(REQUEST_FINISHED),
        }
    }

    /// A builder pre-populated with every link-time registered built-in
    pub fn with_builtins(env: &BuiltinEnv) -> Self {
        let mut builder = Self::new();
        builtin::install_all(&mut builder, env);
        builder
    }

    pub fn request(
        &mut self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn RequestInterceptor>,
    ) -> &mut Self {
        self.request.register(descriptor, plugin);
        self
    }

    pub fn call_start(
        &mut self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn CallStartInterceptor>,
    ) -> &mut Self {
        self.call_start.register(descriptor, plugin);
        self
    }

    pub fn call_result(
        &mut self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn CallResultInterceptor>,
    ) -> &mut Self {
        self.call_result.register(descriptor, plugin);
        self
    }

    pub fn call_finished(
        &mut self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn CallFinishedInterceptor>,
    ) -> &mut Self {
        self.call_finished.register(descriptor, plugin);
        self
    }

    pub fn response(
        &mut self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn ResponseInterceptor>,
    ) -> &mut Self {
        self.response.register(descriptor, plugin);
        self
    }

    /// Resolve every point; the first configuration error aborts
    pub fn build(self) -> Result<GatewayPlugins, ConfigurationError> {
        Ok(GatewayPlugins {
            request: InterceptorChain::new(self.request.resolve()?),
            call_start: InterceptorChain::new(self.call_start.resolve()?),
            call_result: InterceptorChain::new(self.call_result.resolve()?),
            call_finished: InterceptorChain::new(self.call_finished.resolve()?),
            response: InterceptorChain::new(self.response.resolve()?),
        })
    }
}

impl Default for GatewayPluginsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
