//! RPC transport contract
//!
//! A transport either answers inline ([`RpcReply::Ready`]) or hands back a
//! pending future ([`RpcReply::Pending`]) that the gateway drives on its own
//! task. Side-channel metadata travels explicitly: written into the per-call
//! store on the inline path, returned inside [`Completion`] on the pending
//! path.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use super::schema::MethodDescriptor;
use crate::pipeline::metadata::CallMetadata;

/// Transport-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The backend answered with an error status
    #[error("Backend returned status {code}: {message}")]
    Status { code: i32, message: String },

    /// The call never reached the backend or the connection broke
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Arguments or results could not be (de)serialized
    #[error("Serialization failure: {0}")]
    Serialization(String),
}

impl RpcError {
    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result of a finished upstream call, forwarded to its dependents
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResult {
    pub key: String,
    pub value: Value,
}

/// One backend invocation
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Correlation id of the HTTP request this call belongs to
    pub cid: String,
    pub method: Arc<MethodDescriptor>,
    /// Argument values, positionally matching `method.params`
    pub args: Vec<Option<String>>,
    pub upstream: Vec<UpstreamResult>,
}

impl RpcRequest {
    /// Argument value by parameter name
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.method
            .param_index(name)
            .and_then(|i| self.args.get(i))
            .and_then(|v| v.as_deref())
    }
}

/// Eventual outcome of a pending call
#[derive(Debug)]
pub struct Completion {
    pub result: Result<Value, RpcError>,
    pub metadata: CallMetadata,
}

impl Completion {
    pub fn ok(value: Value) -> Self {
        Self {
            result: Ok(value),
            metadata: CallMetadata::default(),
        }
    }

    pub fn err(error: RpcError) -> Self {
        Self {
            result: Err(error),
            metadata: CallMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

pub type PendingCall = BoxFuture<'static, Completion>;

/// Inline value or pending completion
pub enum RpcReply {
    Ready(Value),
    Pending(PendingCall),
}

impl std::fmt::Debug for RpcReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Backend RPC transport
///
/// `invoke` must not block: slow calls return [`RpcReply::Pending`].
pub trait RpcTransport: Send + Sync {
    fn invoke(
        &self,
        request: RpcRequest,
        metadata: &mut CallMetadata,
    ) -> Result<RpcReply, RpcError>;
}
