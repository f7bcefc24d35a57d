//! Constants for the lambda-trace-logger package.
//!
//! This file centralizes all constants to ensure consistency across the codebase
//! and provide a single source of truth for configuration parameters.

/// Environment variable names for configuration.
pub mod env_vars {
    /// Dotted path to the object holding trace continuation headers on the event.
    pub const HEADER_PATH: &str = "LAMBDA_TRACE_HEADER_PATH";

    /// Name of the header carrying the upstream trace id.
    pub const TRACE_ID_HEADER: &str = "LAMBDA_TRACE_ID_HEADER";

    /// Name of the header carrying the upstream parent segment id.
    pub const PARENT_SEGMENT_HEADER: &str = "LAMBDA_TRACE_PARENT_HEADER";

    /// Fall back to the Lambda X-Ray trace header when the event carries no headers.
    pub const USE_XRAY_HEADER: &str = "LAMBDA_TRACE_USE_XRAY_HEADER";

    /// Segment annotations in KEY=VALUE,KEY2=VALUE2 format.
    pub const SEGMENT_ANNOTATIONS: &str = "LAMBDA_TRACE_SEGMENT_ANNOTATIONS";

    /// Lambda advanced logging control level.
    pub const AWS_LAMBDA_LOG_LEVEL: &str = "AWS_LAMBDA_LOG_LEVEL";

    /// Generic log level fallback.
    pub const LOG_LEVEL: &str = "LOG_LEVEL";

    /// Lambda advanced logging control format (TEXT or JSON).
    pub const AWS_LAMBDA_LOG_FORMAT: &str = "AWS_LAMBDA_LOG_FORMAT";

    /// Controls whether to enable the fmt layer for diagnostics regardless of code settings.
    /// Set to "true" to force enable diagnostic output.
    pub const ENABLE_FMT_LAYER: &str = "LAMBDA_TRACING_ENABLE_FMT_LAYER";
}

/// Default values for configuration parameters.
pub mod defaults {
    /// Default location of the headers object on the event.
    pub const HEADER_PATH: &str = "headers";

    /// Default trace id header name.
    pub const TRACE_ID_HEADER: &str = "TRACE-ID";

    /// Default parent segment header name.
    pub const PARENT_SEGMENT_HEADER: &str = "TRACE-PARENT-SEGMENT";

    /// Default value for falling back to the X-Ray trace header.
    pub const USE_XRAY_HEADER: bool = false;

    /// Default value for enabling fmt layer from environment.
    pub const ENABLE_FMT_LAYER: bool = false;
}

/// Fixed strings that end up in log entries and segment metadata.
pub mod entries {
    /// Value of the `source` field on entries written by the service itself.
    pub const SERVICE_SOURCE: &str = "service";

    /// Value of the `source` field on entries forwarded from the AWS SDK.
    pub const SDK_SOURCE: &str = "aws-sdk";

    /// Message used when a thrown payload carries no `error` field.
    pub const UNHANDLED_EXCEPTION: &str = "Unhandled exception. See details.";

    /// Entry written before the handler runs.
    pub const FUNCTION_STARTED: &str = "Function started";

    /// Entry written after the handler resolves.
    pub const FUNCTION_COMPLETED: &str = "Function completed successfully";

    /// Prefix of the entry written after the handler fails.
    pub const FUNCTION_FAILED: &str = "Function failed";

    /// Metadata key holding the triggering event.
    pub const EVENT_METADATA: &str = "Event";

    /// Metadata key holding the handler result.
    pub const RESULT_METADATA: &str = "Result";

    /// Metadata key holding the normalized handler error.
    pub const ERROR_METADATA: &str = "Error";
}
