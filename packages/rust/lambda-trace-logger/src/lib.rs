//! Structured logging correlated with trace segments for AWS Lambda functions.
//!
//! Every invocation of a wrapped handler gets its own trace segment and a logger bound to
//! it. Log entries carry the segment and trace ids, so logs and traces of one request can
//! be joined. Handler failures, whether returned, raised synchronously or raised while the
//! handler future runs, are normalized, logged once, recorded on the segment and returned
//! to the caller.
//!
//! # Features
//!
//! - **Correlated Logging**: JSON entries stamped with `service-name`, `segment-id` and `trace-id`
//! - **Nested Segments**: sub-loggers open child segments within the same trace
//! - **Trace Continuation**: upstream trace ids read from configurable event headers
//! - **Safe Invocation**: panics and errors from the handler arrive on one channel
//! - **Pluggable Backends**: in-memory segments or OpenTelemetry spans
//!
//! # Architecture
//!
//! - [`runner`]: orchestrates one invocation
//! - [`logger`]: the structured logger, sub-loggers and the SDK adapter
//! - [`segment`]: segment and trace service abstractions, with [`memory`] and [`otel`] backends
//! - [`errors`] and [`invoke`]: failure capture and normalization
//! - [`propagation`]: trace continuation from inbound headers
//! - [`config`] and [`telemetry`]: configuration and process-wide setup
//!
//! # Quick Start
//!
//! ```no_run
//! use lambda_trace_logger::{
//!     init_telemetry, HandlerBinding, HandlerError, Invocation, InvocationRunner,
//!     RunnerConfig, SubLoggerOptions, TelemetryConfig,
//! };
//! use lambda_runtime::Error;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! async fn handler(invocation: Invocation) -> Result<Value, HandlerError> {
//!     let lookup = invocation
//!         .logger
//!         .create_sub_logger(SubLoggerOptions::new("lookup", invocation.event.clone()))
//!         .map_err(HandlerError::from_error)?;
//!     lookup.debug("querying");
//!     lookup.close("Result", "found").map_err(HandlerError::from_error)?;
//!
//!     Ok(json!({ "statusCode": 200 }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let (trace_service, completion_handler) = init_telemetry(TelemetryConfig::default())?;
//!
//!     InvocationRunner::new(
//!         HandlerBinding::builder().handler(handler).build(),
//!         RunnerConfig::builder()
//!             .trace_service(Arc::new(trace_service))
//!             .completion_handler(completion_handler)
//!             .build(),
//!     )
//!     .serve()
//!     .await
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables override values set in code:
//!
//! - `LAMBDA_TRACE_HEADER_PATH`: dotted path to the headers object on the event
//!   - Defaults to `headers`
//! - `LAMBDA_TRACE_ID_HEADER` / `LAMBDA_TRACE_PARENT_HEADER`: continuation header names
//!   - Default to `TRACE-ID` / `TRACE-PARENT-SEGMENT`
//! - `LAMBDA_TRACE_USE_XRAY_HEADER`: fall back to the Lambda X-Ray header
//! - `LAMBDA_TRACE_SEGMENT_ANNOTATIONS`: extra segment annotations, `key=value,key2=value2`
//! - `AWS_LAMBDA_LOG_LEVEL` or `LOG_LEVEL`: structured logger level filter
//!
//! See [`telemetry`] for the variables that control diagnostics and resource detection.

pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod invoke;
pub mod logger;
pub mod memory;
pub mod otel;
pub mod propagation;
pub mod runner;
pub mod segment;
pub mod sink;
pub mod telemetry;

pub use config::{env_annotations, RunnerConfig};
pub use context::InvocationContext;
pub use errors::{normalize, ErrorReport, HandlerError, NormalizedError};
pub use invoke::safe_invoke;
pub use logger::{
    Annotations, Level, LevelFilter, LogEntry, LoggerConfig, SdkLogAdapter, StructuredLogger,
    SubLoggerOptions,
};
pub use memory::{MemorySegment, MemoryTraceService, MetadataEntry};
pub use otel::{OtelSegment, OtelTraceService};
pub use propagation::{lambda_trace_parent, parse_xray_header, HeaderMapping};
pub use runner::{HandlerBinding, Invocation, InvocationRunner, RunnerError};
pub use segment::{
    AnnotationValue, ParentSegment, TraceError, TraceParent, TraceSegment, TraceService,
};
pub use sink::{LogSink, StdoutSink};
pub use telemetry::{
    init_telemetry, lambda_resource, TelemetryCompletionHandler, TelemetryConfig,
    TelemetryConfigBuilder, TelemetryError,
};

#[cfg(doctest)]
#[macro_use]
extern crate doc_comment;

#[cfg(doctest)]
use doc_comment::doctest;

#[cfg(doctest)]
doctest!("../README.md", readme);
