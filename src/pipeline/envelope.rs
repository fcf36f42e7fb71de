//! Response envelope
//!
//! ```json
//! {"stat": {"cid": "..", "code": 0, "systime": 1700000000000,
//!           "stateList": [{"code": 0, "msg": "success"}], "metadata": {}},
//!  "content": [<result of each top-level call, in request order>]}
//! ```
//!
//! Call results are spliced in verbatim from their serialized buffers; a
//! failed call contributes `null`. A request-level failure suppresses every
//! call result.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use super::codes::{ApiCode, CallState};
use super::error::{GatewayError, GatewayResult};
use super::metadata::CallMetadata;
use crate::plugin::points::ResponseScope;

/// A written response, ready for the network transport
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub cid: String,
    pub code: ApiCode,
    pub body: Bytes,
}

impl GatewayResponse {
    /// Parse the body back into JSON
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Minimal envelope used when the `request.finished` chain itself fails
    pub fn internal_error(cid: &str, err: &GatewayError) -> Self {
        let code = err.code();
        let body = serde_json::json!({
            "stat": {
                "cid": cid,
                "code": code,
                "systime": systime(),
                "stateList": [],
                "metadata": {},
                "msg": err.to_string(),
            },
            "content": [],
        });
        Self {
            status: 500,
            cid: cid.to_string(),
            code,
            body: serde_json::to_vec(&body).map(Bytes::from).unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct Stat<'a> {
    cid: &'a str,
    code: ApiCode,
    systime: u64,
    #[serde(rename = "stateList")]
    state_list: Vec<CallState>,
    metadata: &'a CallMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

fn systime() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn http_status(origin: Option<&GatewayError>) -> u16 {
    match origin {
        None => 200,
        Some(err) if err.is_client_error() => 400,
        Some(_) => 500,
    }
}

/// Write the envelope for a finished request
pub fn write_envelope(scope: &ResponseScope<'_>) -> GatewayResult<GatewayResponse> {
    let ctx = scope.ctx;
    let code = scope.origin.map_or(ApiCode::SUCCESS, GatewayError::code);

    let (state_list, results): (Vec<_>, Vec<_>) = match (scope.origin, scope.dag) {
        (None, Some(dag)) => dag
            .top_level()
            .iter()
            .filter_map(|id| dag.node(*id))
            .map(|node| {
                let state = node
                    .call_state()
                    .cloned()
                    .unwrap_or_else(|| CallState::from_code(ApiCode::UNKNOWN_ERROR));
                (state, node.result_bytes())
            })
            .unzip(),
        _ => (Vec::new(), Vec::new()),
    };

    let stat = Stat {
        cid: ctx.cid(),
        code,
        systime: systime(),
        state_list,
        metadata: ctx.metadata(),
        msg: scope.origin.map(ToString::to_string),
    };

    let content_len: usize = results.iter().map(|r| r.map_or(4, <[u8]>::len) + 1).sum();
    let mut body = BytesMut::with_capacity(content_len + 256);
    body.put_slice(b"{\"stat\":");
    serde_json::to_writer((&mut body).writer(), &stat)?;
    body.put_slice(b",\"content\":[");
    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            body.put_u8(b',');
        }
        body.put_slice(result.unwrap_or(b"null"));
    }
    body.put_slice(b"]}");

    Ok(GatewayResponse {
        status: http_status(scope.origin),
        cid: ctx.cid().to_string(),
        code,
        body: body.freeze(),
    })
}
