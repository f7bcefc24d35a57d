//! Handler failures and their normalized form.
//!
//! A handler can fail with a real error (something implementing [`std::error::Error`]) or
//! with a plain payload, structured or scalar. [`HandlerError`] captures both and
//! [`normalize`] turns either into the uniform [`NormalizedError`] shape that is logged and
//! attached to the invocation segment.

use crate::constants::entries::UNHANDLED_EXCEPTION;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::backtrace::Backtrace;
use std::fmt;

static FRAME_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+:\s*").expect("valid regex"));
static FRAME_LOCATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^at\s+").expect("valid regex"));

/// A captured structured error: type, message, cause chain and stack.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    type_name: String,
    message: String,
    causes: Vec<String>,
    stack: String,
}

impl ErrorReport {
    /// Capture `error` together with the current stack.
    pub fn capture<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Self::with_type_name(short_type_name(std::any::type_name::<E>()), error)
    }

    fn with_type_name<E>(type_name: &str, error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        let message = error.to_string();
        let stack = format!(
            "{}: {}\n{}",
            type_name,
            message,
            Backtrace::force_capture()
        );

        Self {
            type_name: type_name.to_string(),
            message,
            causes,
            stack,
        }
    }

    /// Report for an error known only by its message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let stack = format!("Error: {}\n{}", message, Backtrace::force_capture());
        Self {
            type_name: "Error".to_string(),
            message,
            causes: Vec::new(),
            stack,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack frames below the error line, stripped of their index decoration.
    ///
    /// Never empty: falls back to the cause chain, then to the error line itself.
    pub fn stack_trace(&self) -> Vec<String> {
        let mut frames: Vec<String> = Vec::new();
        for line in self.stack.lines().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if FRAME_LOCATION.is_match(line) {
                if let Some(last) = frames.last_mut() {
                    last.push(' ');
                    last.push_str(line);
                }
                continue;
            }
            frames.push(FRAME_INDEX.replace(line, "").into_owned());
        }

        if frames.is_empty() {
            frames = self.causes.clone();
        }
        if frames.is_empty() {
            frames.push(self.to_string());
        }
        frames
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// `std::io::error::Error` becomes `Error`, `foo::Wrapper<bar::Baz>` becomes `Wrapper`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Anything a handler can fail with.
#[derive(Debug, Clone)]
pub enum HandlerError {
    /// A real error with a message and a stack.
    Error(ErrorReport),
    /// A plain payload, structured or scalar.
    Value(Value),
}

impl HandlerError {
    /// Wrap a typed error, capturing its stack.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error,
    {
        HandlerError::Error(ErrorReport::capture(&error))
    }

    /// Structured error with just a message, rendered as `Error: <message>`.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Error(ErrorReport::from_message(message))
    }

    /// Fail with an arbitrary serializable payload.
    pub fn payload<T: Serialize>(payload: &T) -> Self {
        HandlerError::Value(serde_json::to_value(payload).unwrap_or(Value::Null))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Error(report) => write!(f, "{}", report),
            HandlerError::Value(Value::String(s)) => write!(f, "{}", s),
            HandlerError::Value(value) => write!(f, "{}", value),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<Value> for HandlerError {
    fn from(value: Value) -> Self {
        HandlerError::Value(value)
    }
}

impl From<&str> for HandlerError {
    fn from(value: &str) -> Self {
        HandlerError::Value(Value::String(value.to_string()))
    }
}

impl From<String> for HandlerError {
    fn from(value: String) -> Self {
        HandlerError::Value(Value::String(value))
    }
}

impl From<lambda_runtime::Error> for HandlerError {
    fn from(error: lambda_runtime::Error) -> Self {
        HandlerError::Error(ErrorReport::with_type_name("Error", error.as_ref()))
    }
}

/// Uniform failure shape: a human readable message plus the diagnostic payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    pub message: String,
    pub error_data: Value,
}

/// Normalize any handler failure.
///
/// - structured errors: the message, plus `{"error": "<Type>: <message>", "stackTrace": [...]}`
/// - structured payloads: the payload's `error` field (or a fixed fallback) and the payload
/// - scalars: the scalar for both
pub fn normalize(error: &HandlerError) -> NormalizedError {
    match error {
        HandlerError::Error(report) => NormalizedError {
            message: report.message().to_string(),
            error_data: json!({
                "error": report.to_string(),
                "stackTrace": report.stack_trace(),
            }),
        },
        HandlerError::Value(value) if value.is_object() || value.is_array() => NormalizedError {
            message: payload_message(value),
            error_data: value.clone(),
        },
        HandlerError::Value(value) => NormalizedError {
            message: scalar_message(value),
            error_data: value.clone(),
        },
    }
}

fn payload_message(payload: &Value) -> String {
    match payload.get("error") {
        None | Some(Value::Null) => UNHANDLED_EXCEPTION.to_string(),
        Some(Value::String(s)) if s.is_empty() => UNHANDLED_EXCEPTION.to_string(),
        Some(value) => scalar_message(value),
    }
}

fn scalar_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
