//! Client-facing API codes
//!
//! Every call state and every response carries one of these codes. Backend
//! status codes are passed through unchanged, so only the gateway's own codes
//! are listed here.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ApiCode(pub i32);

impl ApiCode {
    pub const SUCCESS: ApiCode = ApiCode(0);
    pub const UNKNOWN_ERROR: ApiCode = ApiCode(-100);
    pub const SERVICE_TIMEOUT: ApiCode = ApiCode(-110);
    pub const DEPENDENT_FAILURE: ApiCode = ApiCode(-111);
    pub const SCHEDULING_DEADLOCK: ApiCode = ApiCode(-112);
    pub const API_NOT_FOUND: ApiCode = ApiCode(-120);
    pub const UNKNOWN_DEPENDENT_METHOD: ApiCode = ApiCode(-121);
    pub const PARAMETER_ERROR: ApiCode = ApiCode(-140);
    pub const ACCESS_DENIED: ApiCode = ApiCode(-160);
    pub const TOO_MANY_CALLS: ApiCode = ApiCode(-170);
    pub const SERIALIZE_FAILED: ApiCode = ApiCode(-180);

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Fixed message for gateway codes, empty for passed-through codes
    pub fn default_message(self) -> &'static str {
        match self {
            Self::SUCCESS => "success",
            Self::UNKNOWN_ERROR => "unknown error",
            Self::SERVICE_TIMEOUT => "service timeout",
            Self::DEPENDENT_FAILURE => "dependent call failed",
            Self::SCHEDULING_DEADLOCK => "call could not be scheduled",
            Self::API_NOT_FOUND => "api not found",
            Self::UNKNOWN_DEPENDENT_METHOD => "unknown dependent method",
            Self::PARAMETER_ERROR => "parameter error",
            Self::ACCESS_DENIED => "access denied",
            Self::TOO_MANY_CALLS => "too many calls",
            Self::SERIALIZE_FAILED => "serialize failed",
            _ => "",
        }
    }
}

impl From<ApiCode> for i32 {
    fn from(code: ApiCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for ApiCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final state of one call, as reported in the envelope's `stateList`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallState {
    pub code: i32,
    #[serde(rename = "msg")]
    pub message: String,
}

impl CallState {
    pub fn success() -> Self {
        Self::from_code(ApiCode::SUCCESS)
    }

    pub fn from_code(code: ApiCode) -> Self {
        Self {
            code: code.value(),
            message: code.default_message().to_string(),
        }
    }

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ApiCode::SUCCESS.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_state_serializes_as_code_and_msg() {
        let state = CallState::from_code(ApiCode::SERVICE_TIMEOUT);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({"code": -110, "msg": "service timeout"}));
    }

    #[test]
    fn test_passthrough_code_has_no_default_message() {
        assert_eq!(ApiCode(4001).default_message(), "");
        assert!(ApiCode::SUCCESS.is_success());
        assert_eq!(serde_json::to_string(&ApiCode::ACCESS_DENIED).unwrap(), "-160");
    }
}
