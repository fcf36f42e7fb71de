//! Plugin Isolation and Panic Safety
//!
//! Interceptors and backend completions run inside `catch_unwind` so a
//! panicking plugin fails one chain invocation (or one call) instead of
//! taking down the request task or the worker thread.
//!
//! # Safety Considerations
//!
//! - `catch_unwind` only catches panics, not aborts; the release profile
//!   keeps `panic = "unwind"`
//! - A panic that escapes mid-chain leaves the chain's own bookkeeping
//!   consistent: the cursor has already advanced and nothing was recorded

use std::any::Any;
use std::future::Future;
use std::panic::{UnwindSafe, catch_unwind};

use futures::FutureExt;

/// Call a plugin function, preserving its own error type
///
/// Normal errors pass through untouched. A panic is logged and converted to
/// the caller's error type with `panic_to_error`.
pub fn call_plugin_preserving_error<F, T, E, PC>(plugin_fn: F, panic_to_error: PC) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + UnwindSafe,
    PC: FnOnce(String) -> E,
{
    match catch_unwind(plugin_fn) {
        Ok(result) => result,
        Err(panic_info) => {
            let msg = extract_panic_message(&panic_info);
            tracing::error!(message = %msg, "Plugin panicked");
            Err(panic_to_error(msg))
        }
    }
}

/// Await a future, converting a panic during any poll into `Err(message)`
///
/// Used for backend completions that run on spawned tasks: the task still
/// reports an outcome, so the scheduler never waits on a call whose worker
/// died.
pub async fn catch_unwind_future<F>(future: F) -> Result<F::Output, String>
where
    F: Future,
{
    match std::panic::AssertUnwindSafe(future).catch_unwind().await {
        Ok(output) => Ok(output),
        Err(panic_info) => {
            let msg = extract_panic_message(&panic_info);
            tracing::error!(message = %msg, "Backend completion panicked");
            Err(msg)
        }
    }
}

/// Extract a human-readable message from a panic payload
///
/// Handles `&str` and `String` payloads and falls back to a generic message.
pub fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (non-string payload)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Normal(&'static str),
        Panicked(String),
    }

    #[test]
    fn test_preserving_error_success() {
        let result = call_plugin_preserving_error(|| Ok::<_, TestError>(42), TestError::Panicked);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_preserving_error_keeps_original_error() {
        let result: Result<i32, _> =
            call_plugin_preserving_error(|| Err(TestError::Normal("nope")), TestError::Panicked);
        assert_eq!(result, Err(TestError::Normal("nope")));
    }

    #[test]
    fn test_preserving_error_panic_str() {
        let result: Result<i32, TestError> = call_plugin_preserving_error(
            || {
                panic!("test panic message");
                #[allow(unreachable_code)]
                Ok(42)
            },
            TestError::Panicked,
        );
        match result {
            Err(TestError::Panicked(msg)) => assert!(msg.contains("test panic message")),
            other => panic!("Expected panic error, got {other:?}"),
        }
    }

    #[test]
    fn test_preserving_error_panic_string() {
        let result: Result<i32, TestError> = call_plugin_preserving_error(
            || {
                panic!("{}", "dynamic panic message".to_string());
                #[allow(unreachable_code)]
                Ok(42)
            },
            TestError::Panicked,
        );
        match result {
            Err(TestError::Panicked(msg)) => assert!(msg.contains("dynamic panic message")),
            other => panic!("Expected panic error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_catch_unwind_future_success() {
        let result = catch_unwind_future(async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_catch_unwind_future_panic() {
        let result: Result<i32, String> = catch_unwind_future(async {
            tokio::task::yield_now().await;
            panic!("async panic");
        })
        .await;
        assert_eq!(result, Err("async panic".to_string()));
    }
}
