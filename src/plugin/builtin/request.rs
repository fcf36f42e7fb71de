//! `request.verify` built-ins

use tracing::debug;

use crate::pipeline::error::{GatewayResult, RequestParseError};
use crate::pipeline::parser::{CallGraphParser, MULTI_CALL_PARAM};
use crate::plugin::points::{RequestInterceptor, RequestNext};

/// Rejects requests naming more calls than the configured limit
#[derive(Debug, Clone, Copy)]
pub struct CallLimitGuard {
    limit: usize,
}

impl CallLimitGuard {
    pub const KEY: &'static str = "builtin::request::call_limit";

    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl RequestInterceptor for CallLimitGuard {
    fn verify(&self, next: &mut RequestNext<'_, '_>) -> GatewayResult<()> {
        let ctx = next.args().ctx;
        if let Some(spec) = ctx.param(MULTI_CALL_PARAM) {
            let count = CallGraphParser::count_calls(spec);
            if count > self.limit {
                return Err(RequestParseError::TooManyCalls {
                    count,
                    limit: self.limit,
                }
                .into());
            }
        }
        next.proceed()
    }
}

/// Terminal stage: parses `_mt` into the request's call graph
#[derive(Debug, Clone, Copy, Default)]
pub struct CallGraphStage;

impl CallGraphStage {
    pub const KEY: &'static str = "builtin::request::call_graph";
}

impl RequestInterceptor for CallGraphStage {
    fn verify(&self, next: &mut RequestNext<'_, '_>) -> GatewayResult<()> {
        let ctx = next.args().ctx;
        let spec = ctx.param(MULTI_CALL_PARAM).ok_or(RequestParseError::MissingSpec)?;
        let dag = CallGraphParser::new(ctx.schema()).parse(spec, ctx.params())?;
        debug!(calls = dag.len(), "Call graph parsed");
        next.args_mut().dag = Some(dag);
        Ok(())
    }
}
