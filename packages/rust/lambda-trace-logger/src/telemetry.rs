//! Telemetry setup for Lambda functions.
//!
//! Two things are installed here, both once per process:
//!
//! - a `tracing` subscriber for the crate's own diagnostics (segment creation, state
//!   transitions, backend warnings), filtered by `RUST_LOG` or `AWS_LAMBDA_LOG_LEVEL`
//! - an OpenTelemetry tracer provider, whose tracer backs an [`OtelTraceService`]
//!
//! The returned [`TelemetryCompletionHandler`] flushes the provider after each invocation.
//!
//! # Basic Usage
//!
//! ```no_run
//! use lambda_trace_logger::{init_telemetry, TelemetryConfig};
//!
//! # async fn example() -> Result<(), lambda_runtime::Error> {
//! let (trace_service, completion_handler) = init_telemetry(TelemetryConfig::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! With a span processor and console diagnostics:
//!
//! ```no_run
//! use lambda_trace_logger::{init_telemetry, TelemetryConfig};
//! use opentelemetry_sdk::trace::{InMemorySpanExporter, SimpleSpanProcessor};
//!
//! # fn example() -> Result<(), lambda_runtime::Error> {
//! let config = TelemetryConfig::builder()
//!     .with_span_processor(SimpleSpanProcessor::new(InMemorySpanExporter::default()))
//!     .enable_fmt_layer(true)
//!     .build();
//!
//! let (trace_service, completion_handler) = init_telemetry(config)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_SERVICE_NAME`: Service name for spans
//! - `OTEL_RESOURCE_ATTRIBUTES`: Additional resource attributes (`key=value,key2=value2`)
//! - `LAMBDA_TRACING_ENABLE_FMT_LAYER`: Force the fmt layer on
//! - `AWS_LAMBDA_LOG_FORMAT`: `JSON` switches the fmt layer to JSON output
//! - `RUST_LOG` or `AWS_LAMBDA_LOG_LEVEL`: Diagnostic level filter

use crate::constants::{defaults, env_vars};
use crate::otel::OtelTraceService;
use bon::Builder;
use opentelemetry::{global, trace::TracerProvider as _, InstrumentationScope, KeyValue};
use opentelemetry_sdk::{
    trace::{SdkTracer, SdkTracerProvider, SpanProcessor, TracerProviderBuilder},
    Resource,
};
use std::{borrow::Cow, env, sync::Arc};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use urlencoding::decode;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Flushes finished spans once an invocation is over.
///
/// `Clone` and cheap to share; clones flush the same provider.
#[derive(Clone)]
pub struct TelemetryCompletionHandler {
    provider: Arc<SdkTracerProvider>,
    tracer: SdkTracer,
}

impl TelemetryCompletionHandler {
    pub fn new(provider: Arc<SdkTracerProvider>) -> Self {
        let scope = InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
            .with_version(Cow::Borrowed(env!("CARGO_PKG_VERSION")))
            .with_attributes(vec![
                KeyValue::new("library.language", "rust"),
                KeyValue::new("library.runtime", "aws_lambda"),
            ])
            .build();
        let tracer = provider.tracer_with_scope(scope);

        Self { provider, tracer }
    }

    /// Tracer bound to this crate's instrumentation scope.
    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    /// Flush every span finished during the invocation.
    ///
    /// Export failures are reported as warnings and never fail the invocation.
    pub fn complete(&self) {
        if let Err(e) = self.provider.force_flush() {
            tracing::warn!(error = ?e, "Error flushing telemetry");
        }
    }
}

/// Configuration for [`init_telemetry`].
///
/// # Examples
///
/// ```no_run
/// use lambda_trace_logger::TelemetryConfig;
/// use opentelemetry::KeyValue;
/// use opentelemetry_sdk::Resource;
///
/// let config = TelemetryConfig::builder()
///     .resource(Resource::builder()
///         .with_attributes(vec![KeyValue::new("service.version", "1.0.0")])
///         .build())
///     .env_var_name("MY_LOG_LEVEL".to_string())
///     .build();
/// ```
#[derive(Builder, Debug)]
pub struct TelemetryConfig {
    #[builder(field)]
    provider_builder: TracerProviderBuilder,

    #[builder(field)]
    has_processor: bool,

    /// Print the crate's diagnostics to stdout.
    ///
    /// Default: `false`, forced on by `LAMBDA_TRACING_ENABLE_FMT_LAYER=true`
    #[builder(default = false)]
    pub enable_fmt_layer: bool,

    /// Register the provider as the global OpenTelemetry provider.
    ///
    /// Default: `true`
    #[builder(default = true)]
    pub set_global_provider: bool,

    /// Resource attached to every span. Detected from the Lambda environment when absent.
    pub resource: Option<Resource>,

    /// Environment variable holding the diagnostic level filter.
    ///
    /// Default: `RUST_LOG` when set, `AWS_LAMBDA_LOG_LEVEL` otherwise
    pub env_var_name: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<S: telemetry_config_builder::State> TelemetryConfigBuilder<S> {
    /// Add a span processor to the tracer provider. Can be called repeatedly.
    pub fn with_span_processor<T>(mut self, processor: T) -> Self
    where
        T: SpanProcessor + 'static,
    {
        self.provider_builder = self.provider_builder.with_span_processor(processor);
        self.has_processor = true;
        self
    }
}

/// Resource attributes detected from the Lambda environment.
///
/// `OTEL_RESOURCE_ATTRIBUTES` entries are URL-decoded and override detected values.
pub fn lambda_resource() -> Resource {
    let mut attributes = Vec::new();

    if let Ok(region) = env::var("AWS_REGION") {
        attributes.push(KeyValue::new("cloud.provider", "aws"));
        attributes.push(KeyValue::new("cloud.region", region));
    }

    let service_name = env::var("OTEL_SERVICE_NAME")
        .or_else(|_| env::var("AWS_LAMBDA_FUNCTION_NAME"))
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    attributes.push(KeyValue::new("service.name", service_name));

    if let Ok(function_name) = env::var("AWS_LAMBDA_FUNCTION_NAME") {
        attributes.push(KeyValue::new("faas.name", function_name));
    }
    if let Ok(version) = env::var("AWS_LAMBDA_FUNCTION_VERSION") {
        attributes.push(KeyValue::new("faas.version", version));
    }
    if let Ok(log_stream) = env::var("AWS_LAMBDA_LOG_STREAM_NAME") {
        attributes.push(KeyValue::new("faas.instance", log_stream));
    }

    if let Ok(raw) = env::var("OTEL_RESOURCE_ATTRIBUTES") {
        for (key, value) in parse_key_values(&raw) {
            attributes.push(KeyValue::new(key, value));
        }
    }

    Resource::builder().with_attributes(attributes).build()
}

/// Parse `key=value,key2=value2`, URL-decoding values. Malformed pairs are skipped.
pub(crate) fn parse_key_values(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((key.to_string(), value))
        })
        .collect()
}

/// Install diagnostics and the tracer provider.
///
/// Returns a trace service backed by the provider's tracer, and the handler that flushes it.
///
/// # Errors
///
/// Fails when a global `tracing` subscriber is already installed.
pub fn init_telemetry(
    config: TelemetryConfig,
) -> Result<(OtelTraceService<SdkTracer>, TelemetryCompletionHandler), TelemetryError> {
    let resource = config.resource.unwrap_or_else(lambda_resource);
    let provider = Arc::new(config.provider_builder.with_resource(resource).build());

    if config.set_global_provider {
        global::set_tracer_provider(provider.as_ref().clone());
    }

    let env_var_name = config.env_var_name.as_deref().unwrap_or_else(|| {
        if env::var("RUST_LOG").is_ok() {
            "RUST_LOG"
        } else {
            env_vars::AWS_LAMBDA_LOG_LEVEL
        }
    });
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_env_var(env_var_name)
        .from_env_lossy();

    let subscriber = tracing_subscriber::registry::Registry::default().with(env_filter);

    let enable_fmt_layer = match env::var(env_vars::ENABLE_FMT_LAYER) {
        Ok(value) => value.eq_ignore_ascii_case("true") || config.enable_fmt_layer,
        Err(_) => config.enable_fmt_layer || defaults::ENABLE_FMT_LAYER,
    };

    if enable_fmt_layer {
        let is_json = env::var(env_vars::AWS_LAMBDA_LOG_FORMAT)
            .unwrap_or_default()
            .eq_ignore_ascii_case("JSON");

        if is_json {
            tracing::subscriber::set_global_default(
                subscriber.with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .without_time()
                        .json(),
                ),
            )?;
        } else {
            tracing::subscriber::set_global_default(
                subscriber.with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .without_time()
                        .with_ansi(false),
                ),
            )?;
        }
    } else {
        tracing::subscriber::set_global_default(subscriber)?;
    }

    if !config.has_processor {
        tracing::debug!("no span processor configured, spans will not be exported");
    }

    let completion_handler = TelemetryCompletionHandler::new(provider);
    let trace_service = OtelTraceService::new(completion_handler.tracer().clone());

    Ok((trace_service, completion_handler))
}
