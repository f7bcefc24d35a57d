//! Runner configuration.
//!
//! [`RunnerConfig`] is assembled with a builder and then resolved against the environment.
//! Environment variables take precedence over values set in code, so a deployed function
//! can be re-pointed without a rebuild:
//!
//! ```no_run
//! use lambda_trace_logger::{HeaderMapping, RunnerConfig};
//! use std::env;
//!
//! env::set_var("LAMBDA_TRACE_HEADER_PATH", "params.header");
//!
//! let config = RunnerConfig::builder()
//!     .header_mapping(HeaderMapping::default())
//!     .build()
//!     .resolve();
//! assert_eq!(config.header_mapping.path, "params.header");
//! ```

use crate::constants::{defaults, env_vars};
use crate::logger::{Annotations, LevelFilter};
use crate::otel::OtelTraceService;
use crate::propagation::HeaderMapping;
use crate::segment::{AnnotationValue, TraceService};
use crate::sink::{LogSink, StdoutSink};
use crate::telemetry::{parse_key_values, TelemetryCompletionHandler};
use bon::Builder;
use std::env;
use std::sync::Arc;

/// How the runner logs, traces and continues upstream traces.
#[derive(Builder, Clone)]
pub struct RunnerConfig {
    /// Where trace continuation headers live on the event.
    #[builder(default)]
    pub header_mapping: HeaderMapping,

    /// Fall back to the Lambda X-Ray header when the event carries no continuation headers.
    #[builder(default = defaults::USE_XRAY_HEADER)]
    pub use_lambda_trace_header: bool,

    /// Level filter for the structured logger.
    #[builder(default)]
    pub level_filter: LevelFilter,

    /// Destination of structured log entries.
    #[builder(default = Arc::new(StdoutSink) as Arc<dyn LogSink>)]
    pub sink: Arc<dyn LogSink>,

    /// Backend minting invocation segments. Defaults to the global OpenTelemetry tracer.
    #[builder(default = Arc::new(OtelTraceService::global()) as Arc<dyn TraceService>)]
    pub trace_service: Arc<dyn TraceService>,

    /// Flushes telemetry after each invocation.
    pub completion_handler: Option<TelemetryCompletionHandler>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RunnerConfig {
    /// Apply environment overrides.
    ///
    /// Invalid values are reported and ignored, keeping the configured value.
    pub fn resolve(mut self) -> Self {
        if let Ok(path) = env::var(env_vars::HEADER_PATH) {
            self.header_mapping.path = path;
        }
        if let Ok(name) = env::var(env_vars::TRACE_ID_HEADER) {
            self.header_mapping.trace_id_header = name;
        }
        if let Ok(name) = env::var(env_vars::PARENT_SEGMENT_HEADER) {
            self.header_mapping.parent_segment_header = name;
        }

        match env::var(env_vars::USE_XRAY_HEADER)
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Ok("true") => self.use_lambda_trace_header = true,
            Ok("false") => self.use_lambda_trace_header = false,
            Ok(value) => {
                tracing::warn!(
                    value,
                    "invalid {} in env, using configured value",
                    env_vars::USE_XRAY_HEADER
                );
            }
            Err(_) => {}
        }

        if let Some(level_filter) = LevelFilter::from_env() {
            self.level_filter = level_filter;
        }

        tracing::debug!(
            header.path = %self.header_mapping.path,
            header.trace_id = %self.header_mapping.trace_id_header,
            header.parent = %self.header_mapping.parent_segment_header,
            use_lambda_trace_header = self.use_lambda_trace_header,
            level_filter = ?self.level_filter,
            "resolved runner configuration"
        );

        self
    }
}

/// Annotations from `LAMBDA_TRACE_SEGMENT_ANNOTATIONS` (`key=value,key2=value2`).
///
/// Values are URL-decoded; booleans and numbers are typed.
pub fn env_annotations() -> Annotations {
    env::var(env_vars::SEGMENT_ANNOTATIONS)
        .map(|raw| {
            parse_key_values(&raw)
                .into_iter()
                .map(|(key, value)| (key, AnnotationValue::parse(&value)))
                .collect()
        })
        .unwrap_or_default()
}
