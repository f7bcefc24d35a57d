//! Single-channel handler invocation.
//!
//! A handler can fail in three ways: by panicking before it hands back a future, by
//! panicking while that future is polled, or by resolving to `Err`. [`safe_invoke`] folds
//! all three into the `Err` side of one `Result`, so the caller has exactly one failure
//! path to handle.

use crate::errors::HandlerError;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

/// Run `operation` and resolve its outcome on a single channel.
///
/// Panic payloads become [`HandlerError`]s: a `HandlerError` or `serde_json::Value` payload is
/// passed through, string payloads become string values, anything else becomes a fixed
/// placeholder string.
///
/// # Examples
///
/// ```
/// use lambda_trace_logger::{safe_invoke, HandlerError};
///
/// # async fn example() {
/// let result: Result<(), HandlerError> = safe_invoke(|| async { Err("Boom!".into()) }).await;
/// assert!(result.is_err());
/// # }
/// ```
pub async fn safe_invoke<F, Fut, T>(operation: F) -> Result<T, HandlerError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, HandlerError>>,
{
    let future = match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(future) => future,
        Err(payload) => return Err(from_panic(payload)),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(from_panic(payload)),
    }
}

fn from_panic(payload: Box<dyn Any + Send>) -> HandlerError {
    let payload = match payload.downcast::<HandlerError>() {
        Ok(error) => return *error,
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<Value>() {
        Ok(value) => return HandlerError::Value(*value),
        Err(payload) => payload,
    };
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return HandlerError::from(*message);
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return HandlerError::from(message.clone());
    }
    HandlerError::from("Unknown panic payload")
}
