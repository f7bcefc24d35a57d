//! Invocation orchestration.
//!
//! [`InvocationRunner`] drives one Lambda invocation from start to finish:
//!
//! 1. derives the [`InvocationContext`] and the trace parent from the inbound event
//! 2. opens the root segment and binds a [`StructuredLogger`] to it
//! 3. logs `Function started`, runs the handler through [`safe_invoke`]
//! 4. logs the terminal entry, closes the segment with the result or the normalized error
//! 5. flushes telemetry
//!
//! Every invocation writes exactly one start entry and exactly one terminal entry, and a
//! handler failure is always logged, recorded on the segment and returned to the caller.
//!
//! # Examples
//!
//! ```rust,no_run
//! use lambda_trace_logger::{
//!     init_telemetry, HandlerBinding, HandlerError, Invocation, InvocationRunner,
//!     RunnerConfig, TelemetryConfig,
//! };
//! use lambda_runtime::Error;
//! use serde_json::{json, Value};
//!
//! async fn handler(invocation: Invocation) -> Result<Value, HandlerError> {
//!     invocation.logger.info("doing work");
//!     Ok(json!({ "statusCode": 200 }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let (trace_service, completion_handler) = init_telemetry(TelemetryConfig::default())?;
//!
//!     let runner = InvocationRunner::new(
//!         HandlerBinding::builder().handler(handler).build(),
//!         RunnerConfig::builder()
//!             .trace_service(std::sync::Arc::new(trace_service))
//!             .completion_handler(completion_handler)
//!             .build(),
//!     );
//!
//!     runner.serve().await
//! }
//! ```

use crate::config::{env_annotations, RunnerConfig};
use crate::constants::entries;
use crate::context::InvocationContext;
use crate::errors::{normalize, HandlerError};
use crate::invoke::safe_invoke;
use crate::logger::{Annotations, Level, LoggerConfig, StructuredLogger};
use crate::propagation::lambda_trace_parent;
use crate::segment::{TraceError, TraceParent};
use bon::Builder;
use lambda_runtime::{service_fn, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// The handler failed. The message is the one logged in the terminal entry.
    #[error("{message}")]
    HandlerFailed { message: String },

    #[error("failed to open invocation segment: {0}")]
    Segment(#[from] TraceError),
}

/// Everything a handler receives for one invocation.
pub struct Invocation<C = ()> {
    pub event: Value,
    pub context: Arc<InvocationContext>,
    /// Logger bound to the invocation's root segment.
    pub logger: StructuredLogger,
    /// Shared resources registered with the runner.
    pub clients: C,
}

/// A handler plus the annotations stamped on every invocation segment.
#[derive(Builder)]
pub struct HandlerBinding<H> {
    pub handler: H,

    #[builder(default)]
    pub trace_annotations: Annotations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationState {
    Started,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationState::Started => write!(f, "started"),
            InvocationState::Running => write!(f, "running"),
            InvocationState::Succeeded => write!(f, "succeeded"),
            InvocationState::Failed => write!(f, "failed"),
        }
    }
}

fn transition(request_id: &str, state: InvocationState) {
    tracing::debug!(request.id = request_id, state = %state, "invocation state");
}

/// Runs a handler for each invocation, with logging and tracing around it.
pub struct InvocationRunner<H, C = ()> {
    binding: HandlerBinding<H>,
    clients: C,
    config: RunnerConfig,
}

impl<H> InvocationRunner<H, ()> {
    /// Runner without shared clients. The configuration is resolved against the environment.
    pub fn new(binding: HandlerBinding<H>, config: RunnerConfig) -> Self {
        Self::with_clients(binding, (), config)
    }
}

impl<H, C> InvocationRunner<H, C> {
    /// Runner handing `clients` to every invocation.
    ///
    /// Annotations from `LAMBDA_TRACE_SEGMENT_ANNOTATIONS` are added to the binding's, and
    /// win on conflicting keys.
    pub fn with_clients(mut binding: HandlerBinding<H>, clients: C, config: RunnerConfig) -> Self {
        binding.trace_annotations.extend(env_annotations());
        Self {
            binding,
            clients,
            config: config.resolve(),
        }
    }

    fn trace_parent(&self, event: &Value, context: &InvocationContext) -> TraceParent {
        match self.config.header_mapping.trace_parent(event) {
            TraceParent::NewTrace if self.config.use_lambda_trace_header => {
                lambda_trace_parent(context.xray_trace_id.as_deref())
            }
            parent => parent,
        }
    }
}

impl<H, C, Fut, R> InvocationRunner<H, C>
where
    H: Fn(Invocation<C>) -> Fut + Send + Sync,
    C: Clone + Send + Sync,
    Fut: Future<Output = Result<R, HandlerError>> + Send,
    R: Serialize,
{
    /// Run one invocation.
    ///
    /// Resolves to the handler result, or to the completion message when the handler
    /// returned JSON `null`. A handler failure resolves to [`RunnerError::HandlerFailed`].
    pub async fn run(&self, event: LambdaEvent<Value>) -> Result<Value, RunnerError> {
        let result = self.invoke(event).await;

        if let Some(completion_handler) = &self.config.completion_handler {
            completion_handler.complete();
        }
        result
    }

    /// Run one invocation and report the outcome through `callback(error, result)`.
    ///
    /// The callback is called exactly once: `(None, Some(result))` on success,
    /// `(Some(error), None)` on failure.
    pub async fn run_with_callback<F>(&self, event: LambdaEvent<Value>, callback: F)
    where
        F: FnOnce(Option<RunnerError>, Option<Value>),
    {
        match self.run(event).await {
            Ok(value) => callback(None, Some(value)),
            Err(error) => callback(Some(error), None),
        }
    }

    async fn invoke(&self, event: LambdaEvent<Value>) -> Result<Value, RunnerError> {
        let payload = event.payload;
        let context = Arc::new(InvocationContext::from_lambda(&event.context));
        let request_id = context.request_id.clone();
        transition(&request_id, InvocationState::Started);

        let logger = StructuredLogger::create(
            LoggerConfig::builder()
                .segment_name(context.function_name.clone())
                .trace_annotations(self.binding.trace_annotations.clone())
                .parent(self.trace_parent(&payload, &context))
                .event(payload.clone())
                .sink(self.config.sink.clone())
                .trace_service(self.config.trace_service.clone())
                .level_filter(self.config.level_filter)
                .build(),
        )?;

        logger.lifecycle(Level::Info, entries::FUNCTION_STARTED, &payload);
        transition(&request_id, InvocationState::Running);

        let invocation = Invocation {
            event: payload,
            context,
            logger: logger.clone(),
            clients: self.clients.clone(),
        };
        let handler = &self.binding.handler;
        let outcome = safe_invoke(|| handler(invocation))
            .await
            .and_then(|result| serde_json::to_value(result).map_err(HandlerError::from_error));

        match outcome {
            Ok(value) => {
                logger.lifecycle(Level::Info, entries::FUNCTION_COMPLETED, &value);
                if let Err(e) = logger.close(entries::RESULT_METADATA, &value) {
                    tracing::warn!(error = %e, "failed to close invocation segment");
                }
                transition(&request_id, InvocationState::Succeeded);

                if value.is_null() {
                    Ok(Value::String(entries::FUNCTION_COMPLETED.to_string()))
                } else {
                    Ok(value)
                }
            }
            Err(error) => {
                let normalized = normalize(&error);
                let message = format!("{}: {}", entries::FUNCTION_FAILED, normalized.message);

                logger.lifecycle(Level::Error, &message, &normalized.error_data);
                if let Err(e) = logger.mark_error() {
                    tracing::warn!(error = %e, "failed to flag invocation segment");
                }
                if let Err(e) = logger.close(entries::ERROR_METADATA, &normalized.error_data) {
                    tracing::warn!(error = %e, "failed to close invocation segment");
                }
                transition(&request_id, InvocationState::Failed);

                Err(RunnerError::HandlerFailed { message })
            }
        }
    }
}

impl<H, C, Fut, R> InvocationRunner<H, C>
where
    H: Fn(Invocation<C>) -> Fut + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Serialize + 'static,
{
    /// Serve invocations from the Lambda runtime API until the process ends.
    pub async fn serve(self) -> Result<(), lambda_runtime::Error> {
        let runner = Arc::new(self);
        lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
            let runner = runner.clone();
            async move {
                runner
                    .run(event)
                    .await
                    .map_err(lambda_runtime::Error::from)
            }
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::env_vars;
    use crate::logger::LevelFilter;
    use crate::memory::{MemorySegment, MemoryTraceService};
    use crate::propagation::HeaderMapping;
    use crate::segment::{AnnotationValue, TraceSegment};
    use crate::telemetry::TelemetryCompletionHandler;
    use crate::OtelTraceService;
    use lambda_runtime::Context;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SimpleSpanProcessor};
    use serde_json::json;
    use serial_test::serial;
    use std::env;
    use std::future::{ready, Ready};
    use std::sync::Mutex;

    struct Harness {
        lines: Arc<Mutex<Vec<String>>>,
        traces: MemoryTraceService,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                lines: Arc::new(Mutex::new(Vec::new())),
                traces: MemoryTraceService::new(),
            }
        }

        fn config(&self) -> RunnerConfig {
            let lines = self.lines.clone();
            RunnerConfig::builder()
                .sink(Arc::new(move |line: &str| {
                    lines.lock().unwrap().push(line.to_string())
                }))
                .trace_service(Arc::new(self.traces.clone()))
                .level_filter(LevelFilter::All)
                .build()
        }

        fn entries(&self) -> Vec<Value> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }

        fn root(&self) -> Arc<MemorySegment> {
            self.traces.segments()[0].clone()
        }
    }

    fn lambda_event(payload: Value) -> LambdaEvent<Value> {
        let mut context = Context::default();
        context.request_id = "req-1".to_string();
        context.invoked_function_arn =
            "arn:aws:lambda:eu-west-1:123456789012:function:checkout".to_string();
        LambdaEvent::new(payload, context)
    }

    async fn run_with<H, Fut, R>(
        harness: &Harness,
        handler: H,
        payload: Value,
    ) -> (Option<RunnerError>, Option<Value>)
    where
        H: Fn(Invocation) -> Fut + Send + Sync,
        Fut: Future<Output = Result<R, HandlerError>> + Send,
        R: Serialize,
    {
        let runner = InvocationRunner::new(
            HandlerBinding::builder().handler(handler).build(),
            harness.config(),
        );

        let mut outcome = None;
        let mut calls = 0;
        runner
            .run_with_callback(lambda_event(payload), |error, result| {
                calls += 1;
                outcome = Some((error, result));
            })
            .await;
        assert_eq!(calls, 1);
        outcome.unwrap()
    }

    fn throwing(_: Invocation) -> Ready<Result<Value, HandlerError>> {
        panic!("Boom!")
    }

    #[tokio::test]
    #[serial]
    async fn test_successful_invocation() {
        let harness = Harness::new();
        let (error, result) = run_with(
            &harness,
            |_: Invocation| async { Ok::<_, HandlerError>(json!({"ok": true})) },
            json!({"orderId": 42}),
        )
        .await;

        assert!(error.is_none());
        assert_eq!(result, Some(json!({"ok": true})));

        let entries = harness.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["entry"], "Function started");
        assert_eq!(entries[0]["level"], "info");
        assert_eq!(
            serde_json::from_str::<Value>(entries[0]["details"].as_str().unwrap()).unwrap(),
            json!({"orderId": 42})
        );
        assert_eq!(entries[1]["entry"], "Function completed successfully");
        assert_eq!(entries[1]["service-name"], "checkout");

        let root = harness.root();
        assert_eq!(root.name(), "checkout");
        assert!(root.is_closed());
        assert!(!root.is_error());
        assert_eq!(root.metadata_value("Event"), Some(json!({"orderId": 42})));
        assert_eq!(root.metadata_value("Result"), Some(json!({"ok": true})));
    }

    #[tokio::test]
    #[serial]
    async fn test_synchronous_panic_fails_invocation() {
        let harness = Harness::new();
        let (error, result) = run_with(&harness, throwing, json!({})).await;

        assert!(result.is_none());
        match error {
            Some(RunnerError::HandlerFailed { message }) => {
                assert_eq!(message, "Function failed: Boom!")
            }
            other => panic!("expected handler failure, got {:?}", other),
        }

        let entries = harness.entries();
        let errors: Vec<&Value> = entries.iter().filter(|e| e["level"] == "error").collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["entry"], "Function failed: Boom!");
        assert_eq!(errors[0]["details"], "Boom!");

        let root = harness.root();
        assert!(root.is_closed());
        assert!(root.is_error());
        assert_eq!(root.metadata_value("Error"), Some(json!("Boom!")));
    }

    #[tokio::test]
    #[serial]
    async fn test_structured_error_is_normalized() {
        let harness = Harness::new();
        let (error, _) = run_with(
            &harness,
            |_: Invocation| async { Err::<Value, _>(HandlerError::msg("database down")) },
            json!({}),
        )
        .await;

        assert_eq!(
            error.unwrap().to_string(),
            "Function failed: database down"
        );

        let recorded = harness.root().metadata_value("Error").unwrap();
        assert_eq!(recorded["error"], "Error: database down");
        assert!(!recorded["stackTrace"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_rejected_payload() {
        let harness = Harness::new();
        let (error, _) = run_with(
            &harness,
            |_: Invocation| async { Err::<Value, _>(HandlerError::from(json!({"code": 7}))) },
            json!({}),
        )
        .await;

        assert_eq!(
            error.unwrap().to_string(),
            "Function failed: Unhandled exception. See details."
        );
        assert_eq!(harness.root().metadata_value("Error"), Some(json!({"code": 7})));
    }

    #[tokio::test]
    #[serial]
    async fn test_null_result_resolves_to_completion_message() {
        let harness = Harness::new();
        let (error, result) = run_with(
            &harness,
            |_: Invocation| ready(Ok::<_, HandlerError>(())),
            json!({}),
        )
        .await;

        assert!(error.is_none());
        assert_eq!(result, Some(json!("Function completed successfully")));
        assert_eq!(harness.root().metadata_value("Result"), Some(Value::Null));
    }

    #[tokio::test]
    #[serial]
    async fn test_handler_receives_invocation() {
        let harness = Harness::new();
        let (_, result) = run_with(
            &harness,
            |invocation: Invocation| async move {
                let child = invocation
                    .logger
                    .create_sub_logger(crate::SubLoggerOptions::new("charge", json!({})))
                    .map_err(HandlerError::from_error)?;
                child.info("charging");
                child.close("Result", "charged").map_err(HandlerError::from_error)?;

                Ok::<_, HandlerError>(json!({
                    "event": invocation.event,
                    "account": invocation.context.aws_account_id,
                    "region": invocation.context.aws_region,
                    "request": invocation.context.request_id,
                }))
            },
            json!({"orderId": 42}),
        )
        .await;

        assert_eq!(
            result,
            Some(json!({
                "event": {"orderId": 42},
                "account": 123456789012u64,
                "region": "eu-west-1",
                "request": "req-1",
            }))
        );

        let root = harness.root();
        let child = harness.traces.find("charge").unwrap();
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_id(), Some(root.id()));
        assert!(child.is_closed());
        assert_eq!(harness.entries().len(), 3);
    }

    #[tokio::test]
    #[serial]
    async fn test_continues_trace_from_headers() {
        let harness = Harness::new();
        run_with(
            &harness,
            |_: Invocation| ready(Ok::<_, HandlerError>(json!(1))),
            json!({"headers": {"TRACE-ID": "abc", "TRACE-PARENT-SEGMENT": "1"}}),
        )
        .await;

        let root = harness.root();
        assert_eq!(root.trace_id(), "abc");
        assert_eq!(root.parent_id(), Some("1"));
        assert_eq!(harness.entries()[0]["trace-id"], "abc");
    }

    #[tokio::test]
    #[serial]
    async fn test_custom_header_mapping_and_clients() {
        let harness = Harness::new();
        let config = RunnerConfig {
            header_mapping: HeaderMapping::at("params.header"),
            ..harness.config()
        };

        let runner = InvocationRunner::with_clients(
            HandlerBinding::builder()
                .handler(|invocation: Invocation<Arc<String>>| async move {
                    Ok::<_, HandlerError>(json!(invocation.clients.as_str()))
                })
                .trace_annotations(Annotations::from([(
                    "team".to_string(),
                    AnnotationValue::from("payments"),
                )]))
                .build(),
            Arc::new("table-name".to_string()),
            config,
        );

        let result = runner
            .run(lambda_event(json!({
                "params": {"header": {"trace-id": "abc", "trace-parent-segment": "1"}}
            })))
            .await
            .unwrap();

        assert_eq!(result, json!("table-name"));
        let root = harness.root();
        assert_eq!(root.trace_id(), "abc");
        assert_eq!(
            root.annotations().get("team"),
            Some(&AnnotationValue::from("payments"))
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_lambda_trace_header_fallback() {
        env::remove_var(env_vars::USE_XRAY_HEADER);
        let harness = Harness::new();
        let runner = InvocationRunner::new(
            HandlerBinding::builder()
                .handler(|_: Invocation| ready(Ok::<_, HandlerError>(json!(1))))
                .build(),
            RunnerConfig {
                use_lambda_trace_header: true,
                ..harness.config()
            },
        );

        let mut event = lambda_event(json!({}));
        event.context.xray_trace_id = Some(
            "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1"
                .to_string(),
        );
        runner.run(event).await.unwrap();

        let root = harness.root();
        assert_eq!(root.trace_id(), "1-5759e988-bd862e3fe1be46a994272793");
        assert_eq!(root.parent_id(), Some("53995c3f42cd8ad8"));
    }

    #[tokio::test]
    #[serial]
    async fn test_lifecycle_entries_ignore_level_filter() {
        let harness = Harness::new();
        let config = RunnerConfig {
            level_filter: LevelFilter::Off,
            ..harness.config()
        };

        let runner = InvocationRunner::new(
            HandlerBinding::builder()
                .handler(|invocation: Invocation| async move {
                    invocation.logger.error("handler detail");
                    Ok::<_, HandlerError>(json!({"ok": true}))
                })
                .build(),
            config.clone(),
        );
        runner.run(lambda_event(json!({}))).await.unwrap();

        let entries = harness.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["entry"], "Function started");
        assert_eq!(entries[1]["entry"], "Function completed successfully");

        let failing =
            InvocationRunner::new(HandlerBinding::builder().handler(throwing).build(), config);
        assert!(failing.run(lambda_event(json!({}))).await.is_err());

        let entries = harness.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2]["entry"], "Function started");
        assert_eq!(entries[3]["level"], "error");
        assert_eq!(entries[3]["entry"], "Function failed: Boom!");
    }

    #[tokio::test]
    #[serial]
    async fn test_completion_handler_flushes_each_invocation() {
        let exporter = InMemorySpanExporter::default();
        let provider = Arc::new(
            SdkTracerProvider::builder()
                .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
                .build(),
        );
        let completion_handler = TelemetryCompletionHandler::new(provider);
        let trace_service = OtelTraceService::new(completion_handler.tracer().clone());

        let runner = InvocationRunner::new(
            HandlerBinding::builder()
                .handler(|_: Invocation| ready(Ok::<_, HandlerError>(json!({"ok": true}))))
                .build(),
            RunnerConfig::builder()
                .sink(Arc::new(|_: &str| {}))
                .trace_service(Arc::new(trace_service))
                .completion_handler(completion_handler)
                .build(),
        );

        runner.run(lambda_event(json!({}))).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "checkout");
    }
}
