//! Plugin System for the fanout gateway
//!
//! Every phase of request processing is a plugin-point: an ordered chain of
//! interceptors that cooperatively handle one invocation. This module
//! provides:
//! - Declarative ordering constraints (`before`, `after`, `first`, `last`,
//!   `replaces`, defaults) per plugin
//! - Resolution of those constraints into one fixed order per point at
//!   startup
//! - Continuation-passing chains with panic isolation
//! - Link-time registration of the built-in plugins
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |                      Plugin Resolution                            |
//! |  inventory --> GatewayPluginsBuilder --> PluginRegistry::resolve  |
//! |                                      --> OrderingGraph (Kahn)     |
//! |                                      --> InterceptorChain         |
//! +-------------------------------------------------------------------+
//! ```
//!
//! # Usage
//!
//! ## Adding a plugin to a point
//!
//! ```ignore
//! use fanout_gateway::plugin::prelude::*;
//!
//! struct Audit;
//!
//! impl CallFinishedInterceptor for Audit {
//!     fn finish(&self, next: &mut FinishNext<'_, '_>) -> Result<CallState, CallFailure> {
//!         let state = next.proceed();
//!         // inspect next.args() and state
//!         state
//!     }
//! }
//!
//! let gateway = Gateway::builder(transport, schema)
//!     .plugins(|points| {
//!         points.call_finished(PluginDescriptor::new("audit"), Arc::new(Audit));
//!     })
//!     .build()?;
//! ```

pub mod builtin;
pub mod chain;
pub mod descriptor;
pub mod isolation;
#[macro_use]
pub mod macros;
pub mod ordering;
pub mod points;
pub mod registry;

// Re-exports for convenience
pub use chain::{ChainError, InterceptorChain, Next};
pub use descriptor::PluginDescriptor;
pub use ordering::{GraphError, OrderingGraph};
pub use points::{
    CallDisposition, CallFinishedInterceptor, CallResultInterceptor, CallStartInterceptor,
    GatewayPlugins, GatewayPluginsBuilder, PluginPointSummary, RequestInterceptor,
    ResponseInterceptor,
};
pub use registry::{ConfigurationError, OrderedPluginList, PluginEntry, PluginRegistry};

/// Prelude module for convenient imports
///
/// Use this for plugin development:
/// ```ignore
/// use fanout_gateway::plugin::prelude::*;
/// ```
pub mod prelude {
    pub use super::descriptor::PluginDescriptor;
    pub use super::points::{
        CallDisposition, CallFinishedInterceptor, CallResultInterceptor, CallStartInterceptor,
        FinishNext, FinishScope, GatewayPluginsBuilder, RequestInterceptor, RequestNext,
        RequestScope, ResponseInterceptor, ResponseNext, ResponseScope, ResultNext, ResultScope,
        StartNext, StartScope,
    };

    pub use std::sync::Arc;

    pub use crate::pipeline::{
        ApiCode, CallFailure, CallState, Gateway, GatewayError, GatewayResponse, GatewayResult,
    };
}
