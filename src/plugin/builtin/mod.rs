//! Built-in Plugin Registrations
//!
//! This module registers the gateway's own interceptors with the `inventory`
//! crate. Each entry installs one plugin into a [`GatewayPluginsBuilder`];
//! embedders can replace any of them through descriptor `replaces` or, for
//! default plugins, by registering another plugin with the same capability.
//!
//! # Plugins
//!
//! ## request.verify
//! - `CallLimitGuard` (first), `CallGraphStage` (last)
//!
//! ## call.start
//! - `BlacklistGuard`, `DispatchStage` (last)
//!
//! ## call.result
//! - `JsonResultWriter` (last, default)
//!
//! ## call.finished
//! - `AccessLog` (first), `SchedulerClassifier`, `DependentFailureClassifier`,
//!   `BackendStatusClassifier`, `UnknownErrorClassifier` (last)
//!
//! ## request.finished
//! - `ResponseLog` (first), `JsonEnvelopeWriter` (last, default)

mod call;
mod finished;
mod request;
mod response;

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;

pub use call::{BlacklistGuard, DispatchStage, JsonResultWriter};
pub use finished::{
    AccessLog, BackendStatusClassifier, DependentFailureClassifier, SchedulerClassifier,
    UnknownErrorClassifier,
};
pub use request::{CallGraphStage, CallLimitGuard};
pub use response::{JsonEnvelopeWriter, ResponseLog};

use super::descriptor::PluginDescriptor;
use super::points::GatewayPluginsBuilder;
use crate::config::PipelineConfig;
use crate::pipeline::buffer::BufferPool;

/// Shared resources handed to built-in plugin installers
#[derive(Clone)]
pub struct BuiltinEnv {
    pub pipeline: PipelineConfig,
    pub blacklist: Arc<ArcSwap<HashSet<String>>>,
    pub buffers: Arc<BufferPool>,
}

impl BuiltinEnv {
    pub fn new(
        pipeline: PipelineConfig,
        blacklist: Arc<ArcSwap<HashSet<String>>>,
        buffers: Arc<BufferPool>,
    ) -> Self {
        Self {
            pipeline,
            blacklist,
            buffers,
        }
    }
}

/// Installer function for one built-in plugin
pub type InstallFn = fn(&mut GatewayPluginsBuilder, &BuiltinEnv);

/// Link-time registration entry
pub struct BuiltinPlugin {
    pub key: &'static str,
    pub install: InstallFn,
}

impl BuiltinPlugin {
    pub const fn new(key: &'static str, install: InstallFn) -> Self {
        Self { key, install }
    }
}

inventory::collect!(BuiltinPlugin);

/// Install every registered built-in, in key order
pub(crate) fn install_all(builder: &mut GatewayPluginsBuilder, env: &BuiltinEnv) {
    let mut builtins: Vec<&BuiltinPlugin> = inventory::iter::<BuiltinPlugin>.into_iter().collect();
    builtins.sort_by_key(|b| b.key);
    for builtin in builtins {
        tracing::debug!(plugin = builtin.key, "Installing built-in plugin");
        (builtin.install)(builder, env);
    }
}

// ============================================================================
// request.verify
// ============================================================================

fn install_call_limit_guard(builder: &mut GatewayPluginsBuilder, env: &BuiltinEnv) {
    builder.request(
        PluginDescriptor::new(CallLimitGuard::KEY).first(),
        Arc::new(CallLimitGuard::new(env.pipeline.max_calls_per_request)),
    );
}

fn install_call_graph_stage(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.request(PluginDescriptor::new(CallGraphStage::KEY).last(), Arc::new(CallGraphStage));
}

crate::register_builtin_plugin!(CallLimitGuard::KEY, install_call_limit_guard);
crate::register_builtin_plugin!(CallGraphStage::KEY, install_call_graph_stage);

// ============================================================================
// call.start
// ============================================================================

fn install_blacklist_guard(builder: &mut GatewayPluginsBuilder, env: &BuiltinEnv) {
    builder.call_start(
        PluginDescriptor::new(BlacklistGuard::KEY),
        Arc::new(BlacklistGuard::new(Arc::clone(&env.blacklist))),
    );
}

fn install_dispatch_stage(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.call_start(PluginDescriptor::new(DispatchStage::KEY).last(), Arc::new(DispatchStage));
}

crate::register_builtin_plugin!(BlacklistGuard::KEY, install_blacklist_guard);
crate::register_builtin_plugin!(DispatchStage::KEY, install_dispatch_stage);

// ============================================================================
// call.result
// ============================================================================

fn install_json_result_writer(builder: &mut GatewayPluginsBuilder, env: &BuiltinEnv) {
    builder.call_result(
        PluginDescriptor::new(JsonResultWriter::KEY)
            .capability(JsonResultWriter::CAPABILITY)
            .last()
            .as_default(),
        Arc::new(JsonResultWriter::new(Arc::clone(&env.buffers))),
    );
}

crate::register_builtin_plugin!(JsonResultWriter::KEY, install_json_result_writer);

// ============================================================================
// call.finished
// ============================================================================

fn install_access_log(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.call_finished(PluginDescriptor::new(AccessLog::KEY).first(), Arc::new(AccessLog));
}

fn install_scheduler_classifier(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.call_finished(
        PluginDescriptor::new(SchedulerClassifier::KEY),
        Arc::new(SchedulerClassifier),
    );
}

fn install_dependent_failure_classifier(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.call_finished(
        PluginDescriptor::new(DependentFailureClassifier::KEY),
        Arc::new(DependentFailureClassifier),
    );
}

fn install_backend_status_classifier(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.call_finished(
        PluginDescriptor::new(BackendStatusClassifier::KEY),
        Arc::new(BackendStatusClassifier),
    );
}

fn install_unknown_error_classifier(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.call_finished(
        PluginDescriptor::new(UnknownErrorClassifier::KEY).last(),
        Arc::new(UnknownErrorClassifier),
    );
}

crate::register_builtin_plugin!(AccessLog::KEY, install_access_log);
crate::register_builtin_plugin!(SchedulerClassifier::KEY, install_scheduler_classifier);
crate::register_builtin_plugin!(
    DependentFailureClassifier::KEY,
    install_dependent_failure_classifier
);
crate::register_builtin_plugin!(BackendStatusClassifier::KEY, install_backend_status_classifier);
crate::register_builtin_plugin!(UnknownErrorClassifier::KEY, install_unknown_error_classifier);

// ============================================================================
// request.finished
// ============================================================================

fn install_response_log(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.response(PluginDescriptor::new(ResponseLog::KEY).first(), Arc::new(ResponseLog));
}

fn install_json_envelope_writer(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
    builder.response(
        PluginDescriptor::new(JsonEnvelopeWriter::KEY)
            .capability(JsonEnvelopeWriter::CAPABILITY)
            .last()
            .as_default(),
        Arc::new(JsonEnvelopeWriter),
    );
}

crate::register_builtin_plugin!(ResponseLog::KEY, install_response_log);
crate::register_builtin_plugin!(JsonEnvelopeWriter::KEY, install_json_envelope_writer);
