//! `call.finished` built-ins
//!
//! The classifiers each recognise one family of failures and assign its
//! [`CallState`]; anything they do not recognise proceeds down the chain to
//! [`UnknownErrorClassifier`], which catches the rest.

use tracing::{debug, info, warn};

use crate::pipeline::codes::{ApiCode, CallState};
use crate::pipeline::error::CallFailure;
use crate::plugin::points::{CallFinishedInterceptor, FinishNext};
use crate::rpc::RpcError;

/// One log line per finished call
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

impl AccessLog {
    pub const KEY: &'static str = "builtin::finished::access_log";
}

impl CallFinishedInterceptor for AccessLog {
    fn finish(&self, next: &mut FinishNext<'_, '_>) -> Result<CallState, CallFailure> {
        let state = next.proceed();

        let scope = next.args();
        let code = state
            .as_ref()
            .map_or(ApiCode::UNKNOWN_ERROR.value(), |s| s.code);
        let duration_ms = scope.elapsed.as_millis() as u64;
        let call = scope.node.key();
        match scope.failure {
            Some(failure) if failure.is_inherited() => {
                debug!(
                    call,
                    code,
                    cause = %failure.root_cause(),
                    "Call skipped after upstream failure"
                );
            }
            Some(failure) => {
                warn!(
                    call,
                    method = scope.node.method_name(),
                    code,
                    duration_ms,
                    error = %failure,
                    "Call failed"
                );
            }
            None => {
                info!(call, method = scope.node.method_name(), code, duration_ms, "Call finished");
            }
        }
        state
    }
}

/// Timeouts and scheduling deadlocks
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerClassifier;

impl SchedulerClassifier {
    pub const KEY: &'static str = "builtin::finished::scheduler";
}

impl CallFinishedInterceptor for SchedulerClassifier {
    fn finish(&self, next: &mut FinishNext<'_, '_>) -> Result<CallState, CallFailure> {
        let failure = next.args().failure;
        match failure {
            Some(CallFailure::Timeout { after_ms }) => Ok(CallState::new(
                ApiCode::SERVICE_TIMEOUT.value(),
                format!("call did not finish within {after_ms} ms"),
            )),
            Some(CallFailure::Deadlock) => Ok(CallState::from_code(ApiCode::SCHEDULING_DEADLOCK)),
            _ => next.proceed(),
        }
    }
}

/// Calls that never ran because a predecessor failed
#[derive(Debug, Clone, Copy, Default)]
pub struct DependentFailureClassifier;

impl DependentFailureClassifier {
    pub const KEY: &'static str = "builtin::finished::dependent";
}

impl CallFinishedInterceptor for DependentFailureClassifier {
    fn finish(&self, next: &mut FinishNext<'_, '_>) -> Result<CallState, CallFailure> {
        let failure = next.args().failure;
        match failure {
            Some(CallFailure::Dependent { upstream, .. }) => Ok(CallState::new(
                ApiCode::DEPENDENT_FAILURE.value(),
                format!("dependent call '{upstream}' failed"),
            )),
            _ => next.proceed(),
        }
    }
}

/// Backend statuses and interceptor rejections keep their own code,
/// unless that code is the success code
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendStatusClassifier;

impl BackendStatusClassifier {
    pub const KEY: &'static str = "builtin::finished::backend_status";
}

impl CallFinishedInterceptor for BackendStatusClassifier {
    fn finish(&self, next: &mut FinishNext<'_, '_>) -> Result<CallState, CallFailure> {
        let failure = next.args().failure;
        match failure {
            // A failed call never reports the success code
            Some(CallFailure::Execution(RpcError::Status { code, message }))
                if *code != ApiCode::SUCCESS.value() =>
            {
                Ok(CallState::new(*code, message.clone()))
            }
            Some(CallFailure::Rejected { code, message }) if !code.is_success() => {
                Ok(CallState::new(code.value(), message.clone()))
            }
            Some(CallFailure::Serialization(_)) => {
                Ok(CallState::from_code(ApiCode::SERIALIZE_FAILED))
            }
            _ => next.proceed(),
        }
    }
}

/// Terminal classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownErrorClassifier;

impl UnknownErrorClassifier {
    pub const KEY: &'static str = "builtin::finished::unknown_error";
}

impl CallFinishedInterceptor for UnknownErrorClassifier {
    fn finish(&self, next: &mut FinishNext<'_, '_>) -> Result<CallState, CallFailure> {
        match next.args().failure {
            None => Ok(CallState::success()),
            Some(_) => Ok(CallState::from_code(ApiCode::UNKNOWN_ERROR)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::pipeline::node::CallDag;
    use crate::plugin::ChainError;
    use crate::plugin::descriptor::PluginDescriptor;
    use crate::plugin::points::{FinishScope, GatewayPlugins, GatewayPluginsBuilder};
    use crate::rpc::MethodDescriptor;

    fn plugins() -> GatewayPlugins {
        let mut builder = GatewayPluginsBuilder::new();
        builder
            .call_finished(PluginDescriptor::new(AccessLog::KEY).first(), Arc::new(AccessLog))
            .call_finished(
                PluginDescriptor::new(SchedulerClassifier::KEY),
                Arc::new(SchedulerClassifier),
            )
            .call_finished(
                PluginDescriptor::new(DependentFailureClassifier::KEY),
                Arc::new(DependentFailureClassifier),
            )
            .call_finished(
                PluginDescriptor::new(BackendStatusClassifier::KEY),
                Arc::new(BackendStatusClassifier),
            )
            .call_finished(
                PluginDescriptor::new(UnknownErrorClassifier::KEY).last(),
                Arc::new(UnknownErrorClassifier),
            );
        builder.build().unwrap()
    }

    fn classify(failure: Option<CallFailure>) -> CallState {
        let mut dag = CallDag::new();
        dag.add_call("m", Arc::new(MethodDescriptor::new("m")), vec![]);
        plugins()
            .finish_call(FinishScope {
                cid: "c",
                node: &dag.nodes()[0],
                failure: failure.as_ref(),
                elapsed: Duration::from_millis(3),
            })
            .unwrap()
    }

    #[test]
    fn test_success() {
        assert_eq!(classify(None), CallState::success());
    }

    #[test]
    fn test_backend_status_passes_through() {
        let state = classify(Some(CallFailure::Execution(RpcError::status(404, "no such user"))));
        assert_eq!(state, CallState::new(404, "no such user"));
    }

    #[test]
    fn test_failure_with_success_status_is_unknown() {
        let state = classify(Some(CallFailure::Execution(RpcError::status(0, "weird"))));
        assert_eq!(state, CallState::from_code(ApiCode::UNKNOWN_ERROR));

        let rejected = classify(Some(CallFailure::Rejected {
            code: ApiCode::SUCCESS,
            message: "not really".to_string(),
        }));
        assert_eq!(rejected.code, ApiCode::UNKNOWN_ERROR.value());
    }

    #[test]
    fn test_timeout_and_deadlock() {
        assert_eq!(
            classify(Some(CallFailure::Timeout { after_ms: 50 })).code,
            ApiCode::SERVICE_TIMEOUT.value()
        );
        assert_eq!(
            classify(Some(CallFailure::Deadlock)).code,
            ApiCode::SCHEDULING_DEADLOCK.value()
        );
    }

    #[test]
    fn test_dependent_failure_names_upstream() {
        let cause = CallFailure::Execution(RpcError::status(500, "boom"));
        let state = classify(Some(CallFailure::dependent("a@x", cause)));
        assert_eq!(state.code, ApiCode::DEPENDENT_FAILURE.value());
        assert!(state.message.contains("a@x"));
    }

    #[test]
    fn test_unclassified_failures_are_unknown() {
        let transport = classify(Some(CallFailure::Execution(RpcError::transport("reset"))));
        assert_eq!(transport, CallState::from_code(ApiCode::UNKNOWN_ERROR));

        let chain = classify(Some(CallFailure::Chain(ChainError::Unterminated {
            point: "call.start",
        })));
        assert_eq!(chain.code, ApiCode::UNKNOWN_ERROR.value());
    }
}
