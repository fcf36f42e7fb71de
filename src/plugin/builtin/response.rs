//! `request.finished` built-ins

use tracing::{error, info, warn};

use crate::pipeline::envelope::{self, GatewayResponse};
use crate::pipeline::error::GatewayResult;
use crate::pipeline::metadata::SERVICE_LOG_KEY;
use crate::pipeline::node::CallDag;
use crate::plugin::points::{ResponseInterceptor, ResponseNext};

/// One summary line per request
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseLog;

impl ResponseLog {
    pub const KEY: &'static str = "builtin::response::log";
}

impl ResponseInterceptor for ResponseLog {
    fn respond(&self, next: &mut ResponseNext<'_, '_>) -> GatewayResult<GatewayResponse> {
        let result = next.proceed();

        let scope = next.args();
        let duration_ms = scope.ctx.elapsed().as_millis() as u64;
        match (scope.origin, &result) {
            (Some(origin), _) => {
                warn!(code = %origin.code(), duration_ms, error = %origin, "Request rejected");
            }
            (None, Ok(response)) => {
                let calls = scope.dag.map_or(0, CallDag::len);
                let failed = scope.node_failures().len();
                let service_log = scope.ctx.metadata().get(SERVICE_LOG_KEY).unwrap_or_default();
                info!(
                    calls,
                    failed,
                    code = %response.code,
                    duration_ms,
                    service_log,
                    "Request finished"
                );
            }
            (None, Err(err)) => {
                error!(error = %err, "Response could not be written");
            }
        }
        result
    }
}

/// Terminal stage: writes the JSON envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeWriter;

impl JsonEnvelopeWriter {
    pub const KEY: &'static str = "builtin::response::json_envelope";
    pub const CAPABILITY: &'static str = "request.finished.writer";
}

impl ResponseInterceptor for JsonEnvelopeWriter {
    fn respond(&self, next: &mut ResponseNext<'_, '_>) -> GatewayResult<GatewayResponse> {
        envelope::write_envelope(next.args())
    }
}
