//! Pipeline error types
//!
//! Two families: request-level errors, which stop the request before any call
//! runs, and call-level failures, which finish one node and are reported in
//! that call's state while sibling branches continue.

use std::sync::Arc;

use thiserror::Error;

use super::codes::ApiCode;
use crate::plugin::ChainError;
use crate::rpc::RpcError;

/// Result type for request-level operations
pub type GatewayResult<T> = Result<T, GatewayError>;

// ============================================================================
// Request parsing
// ============================================================================

/// Malformed or unacceptable multi-call specification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestParseError {
    /// The `_mt` parameter is absent
    #[error("Missing multi-call parameter '_mt'")]
    MissingSpec,

    /// The `_mt` parameter holds no call
    #[error("Empty multi-call specification")]
    EmptySpec,

    #[error("Malformed call specification: '{0}'")]
    MalformedSpec(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A dependency names no earlier call in the same request
    #[error("Call '{call}' depends on unknown method '{dependency}'")]
    UnknownDependentMethod { call: String, dependency: String },

    #[error("Duplicate call alias: {0}")]
    DuplicateAlias(String),

    #[error("Call '{call}' is missing required parameter '{param}'")]
    MissingParameter { call: String, param: String },

    #[error("Too many calls in one request: {count} (limit {limit})")]
    TooManyCalls { count: usize, limit: usize },
}

impl RequestParseError {
    pub fn code(&self) -> ApiCode {
        match self {
            Self::MissingSpec
            | Self::EmptySpec
            | Self::MalformedSpec(_)
            | Self::DuplicateAlias(_)
            | Self::MissingParameter { .. } => ApiCode::PARAMETER_ERROR,
            Self::MethodNotFound(_) => ApiCode::API_NOT_FOUND,
            Self::UnknownDependentMethod { .. } => ApiCode::UNKNOWN_DEPENDENT_METHOD,
            Self::TooManyCalls { .. } => ApiCode::TOO_MANY_CALLS,
        }
    }
}

// ============================================================================
// Call execution
// ============================================================================

/// Why a single call did not succeed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallFailure {
    /// Transport or backend failure
    #[error("Call execution failed: {0}")]
    Execution(#[from] RpcError),

    /// A predecessor failed; this call never ran
    #[error("Upstream call '{upstream}' failed: {cause}")]
    Dependent {
        upstream: String,
        cause: Arc<CallFailure>,
    },

    /// Still unfinished when the request deadline expired
    #[error("Call did not finish within {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Waiting on predecessors that can never finish
    #[error("Call could not be scheduled: unresolved dependency cycle")]
    Deadlock,

    /// Refused by a `call.start` interceptor
    #[error("Call rejected: {message}")]
    Rejected { code: ApiCode, message: String },

    /// Result could not be serialized for the response
    #[error("Result serialization failed: {0}")]
    Serialization(String),

    /// An interceptor chain misbehaved
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl CallFailure {
    pub fn dependent(upstream: impl Into<String>, cause: CallFailure) -> Self {
        Self::Dependent {
            upstream: upstream.into(),
            cause: Arc::new(cause),
        }
    }

    pub fn rejected(code: ApiCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Returns true if the failure was inherited from a predecessor
    pub fn is_inherited(&self) -> bool {
        matches!(self, Self::Dependent { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The originating failure behind any chain of inherited failures
    pub fn root_cause(&self) -> &CallFailure {
        let mut current = self;
        while let Self::Dependent { cause, .. } = current {
            current = cause.as_ref();
        }
        current
    }

    /// Short classification used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execution(_) => "execution",
            Self::Dependent { .. } => "dependent",
            Self::Timeout { .. } => "timeout",
            Self::Deadlock => "deadlock",
            Self::Rejected { .. } => "rejected",
            Self::Serialization(_) => "serialization",
            Self::Chain(_) => "chain",
        }
    }
}

impl From<serde_json::Error> for CallFailure {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ============================================================================
// Request level
// ============================================================================

/// Failure of the request as a whole
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error(transparent)]
    Parse(#[from] RequestParseError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Response serialization failed: {0}")]
    Serialization(String),
}

impl GatewayError {
    pub fn code(&self) -> ApiCode {
        match self {
            Self::Parse(e) => e.code(),
            Self::Chain(_) => ApiCode::UNKNOWN_ERROR,
            Self::Serialization(_) => ApiCode::SERIALIZE_FAILED,
        }
    }

    /// Returns true if the client sent a bad request
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_dependents() {
        let root = CallFailure::Execution(RpcError::status(503, "down"));
        let nested = CallFailure::dependent("b", CallFailure::dependent("a", root.clone()));
        assert!(nested.is_inherited());
        assert_eq!(nested.root_cause(), &root);
        assert!(nested.to_string().contains("Upstream call 'b' failed"));
    }

    #[test]
    fn test_parse_error_codes() {
        assert_eq!(
            RequestParseError::MethodNotFound("x".into()).code(),
            ApiCode::API_NOT_FOUND
        );
        assert_eq!(
            RequestParseError::UnknownDependentMethod {
                call: "b".into(),
                dependency: "a".into()
            }
            .code(),
            ApiCode::UNKNOWN_DEPENDENT_METHOD
        );
        assert_eq!(
            RequestParseError::TooManyCalls { count: 3, limit: 2 }.code(),
            ApiCode::TOO_MANY_CALLS
        );
        assert!(GatewayError::from(RequestParseError::EmptySpec).is_client_error());
    }

    #[test]
    fn test_chain_error_is_internal() {
        let err = GatewayError::from(ChainError::Unterminated { point: "request.verify" });
        assert_eq!(err.code(), ApiCode::UNKNOWN_ERROR);
        assert!(!err.is_client_error());
    }
}
