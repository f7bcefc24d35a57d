//! Structured logging bound to a trace segment.
//!
//! A [`StructuredLogger`] owns one [`TraceSegment`] and stamps every entry it writes with that
//! segment's identity, so log lines and traces can be joined on `trace-id` and `segment-id`.
//!
//! # Example
//! ```
//! use lambda_trace_logger::{LoggerConfig, MemoryTraceService, StdoutSink, StructuredLogger};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let logger = StructuredLogger::create(
//!     LoggerConfig::builder()
//!         .segment_name("checkout")
//!         .sink(Arc::new(StdoutSink))
//!         .trace_service(Arc::new(MemoryTraceService::new()))
//!         .build(),
//! )
//! .unwrap();
//!
//! logger.info("basket loaded");
//! logger.debug_with("basket contents", json!({"items": 3}));
//!
//! // Scope a sub-operation to its own nested segment
//! let payment = logger
//!     .create_sub_logger(lambda_trace_logger::SubLoggerOptions::new("payment", json!({})))
//!     .unwrap();
//! payment.warn("card declined, retrying");
//! payment.close("Result", json!("paid")).unwrap();
//!
//! logger.close("Result", json!({"ok": true})).unwrap();
//! ```
//!
//! # Entry format
//!
//! Each call writes one pretty-printed JSON object:
//!
//! ```json
//! {
//!   "level": "info",
//!   "entry": "basket loaded",
//!   "service-name": "checkout",
//!   "segment-id": "53995c3f42cd8ad8",
//!   "trace-id": "1-5759e988-bd862e3fe1be46a994272793",
//!   "source": "service"
//! }
//! ```
//!
//! Objects and arrays passed as the message or details are embedded as JSON strings.
//! `details` is left out when not supplied.

use crate::constants::{entries, env_vars};
use crate::segment::{
    AnnotationValue, ParentSegment, TraceError, TraceParent, TraceSegment, TraceService,
};
use crate::sink::LogSink;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::sync::Arc;

/// Segment annotations keyed by name.
pub type Annotations = BTreeMap<String, AnnotationValue>;

/// Severity of a log entry, from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warn => write!(f, "warn"),
            Level::Info => write!(f, "info"),
            Level::Debug => write!(f, "debug"),
        }
    }
}

/// Most verbose level a logger writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelFilter {
    /// Write nothing.
    Off,
    /// Write entries up to and including this level.
    Max(Level),
    /// Write everything.
    #[default]
    All,
}

impl LevelFilter {
    pub fn allows(self, level: Level) -> bool {
        match self {
            LevelFilter::Off => false,
            LevelFilter::Max(max) => level <= max,
            LevelFilter::All => true,
        }
    }

    /// Parse `none`, `error`, `warn`, `info`, `debug` (case-insensitive). `trace` maps to all.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" | "off" => Some(LevelFilter::Off),
            "error" => Some(LevelFilter::Max(Level::Error)),
            "warn" => Some(LevelFilter::Max(Level::Warn)),
            "info" => Some(LevelFilter::Max(Level::Info)),
            "debug" => Some(LevelFilter::Max(Level::Debug)),
            "trace" | "all" => Some(LevelFilter::All),
            _ => None,
        }
    }

    /// Read `AWS_LAMBDA_LOG_LEVEL`, then `LOG_LEVEL`.
    pub fn from_env() -> Option<Self> {
        let raw = env::var(env_vars::AWS_LAMBDA_LOG_LEVEL)
            .or_else(|_| env::var(env_vars::LOG_LEVEL))
            .ok()?;
        let filter = Self::parse(&raw);
        if filter.is_none() {
            tracing::warn!(value = %raw, "invalid log level in environment, ignoring");
        }
        filter
    }
}

/// One structured record handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: Level,
    pub entry: Value,
    #[serde(rename = "service-name")]
    pub service_name: String,
    #[serde(rename = "segment-id")]
    pub segment_id: String,
    #[serde(rename = "trace-id")]
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub source: String,
    /// Caller supplied attributes, merged over the standard fields.
    #[serde(skip)]
    pub extra: Map<String, Value>,
}

impl LogEntry {
    /// Pretty-printed JSON with extra attributes applied last.
    pub fn to_line(&self) -> String {
        let mut fields = match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        for (key, value) in &self.extra {
            fields.insert(key.clone(), value.clone());
        }
        serde_json::to_string_pretty(&Value::Object(fields)).unwrap_or_default()
    }
}

/// Objects and arrays become pretty JSON text, scalars pass through.
fn embed(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => {
            Value::String(serde_json::to_string_pretty(&value).unwrap_or_default())
        }
        scalar => scalar,
    }
}

fn to_json<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)))
}

/// Everything needed to open a segment and bind a logger to it.
#[derive(Builder)]
pub struct LoggerConfig {
    /// Name of the segment, usually the function or operation name.
    #[builder(into)]
    pub segment_name: String,

    /// Annotations attached to the segment and inherited by sub-loggers.
    #[builder(default)]
    pub trace_annotations: Annotations,

    /// Parent of the new segment. Defaults to starting a new trace.
    #[builder(default)]
    pub parent: TraceParent,

    /// Payload recorded as the segment's `Event` metadata.
    #[builder(default)]
    pub event: Value,

    pub sink: Arc<dyn LogSink>,

    pub trace_service: Arc<dyn TraceService>,

    #[builder(default)]
    pub level_filter: LevelFilter,
}

/// Options for [`StructuredLogger::create_sub_logger`].
#[derive(Debug, Clone, Builder)]
pub struct SubLoggerOptions {
    #[builder(into)]
    pub segment_name: String,

    #[builder(default)]
    pub event: Value,
}

impl SubLoggerOptions {
    pub fn new(segment_name: impl Into<String>, event: Value) -> Self {
        Self {
            segment_name: segment_name.into(),
            event,
        }
    }
}

struct LoggerInner {
    segment: Arc<dyn TraceSegment>,
    trace_annotations: Arc<Annotations>,
    sink: Arc<dyn LogSink>,
    trace_service: Arc<dyn TraceService>,
    level_filter: LevelFilter,
}

/// Leveled structured logger bound to one trace segment.
///
/// Cloning is cheap; clones write through the same segment.
#[derive(Clone)]
pub struct StructuredLogger {
    inner: Arc<LoggerInner>,
}

impl fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("segment_name", &self.inner.segment.name())
            .field("segment_id", &self.inner.segment.id())
            .field("trace_id", &self.inner.segment.trace_id())
            .finish()
    }
}

impl StructuredLogger {
    /// Open a segment and bind a logger to it.
    ///
    /// The event is recorded as `Event` metadata and every annotation is attached.
    pub fn create(config: LoggerConfig) -> Result<Self, TraceError> {
        Self::open(
            config.segment_name,
            config.parent,
            config.event,
            Arc::new(config.trace_annotations),
            config.sink,
            config.trace_service,
            config.level_filter,
        )
    }

    fn open(
        segment_name: String,
        parent: TraceParent,
        event: Value,
        trace_annotations: Arc<Annotations>,
        sink: Arc<dyn LogSink>,
        trace_service: Arc<dyn TraceService>,
        level_filter: LevelFilter,
    ) -> Result<Self, TraceError> {
        let segment = trace_service.create_segment(&segment_name, &parent);

        segment.add_metadata(entries::EVENT_METADATA, &event)?;
        for (key, value) in trace_annotations.iter() {
            segment.add_annotation(key, value)?;
        }

        Ok(Self {
            inner: Arc::new(LoggerInner {
                segment,
                trace_annotations,
                sink,
                trace_service,
                level_filter,
            }),
        })
    }

    /// The segment this logger writes through.
    pub fn segment(&self) -> &Arc<dyn TraceSegment> {
        &self.inner.segment
    }

    /// Write one entry.
    ///
    /// This is the general form behind the leveled helpers. `extra` attributes are merged
    /// last and may override standard fields.
    pub fn emit(
        &self,
        level: Level,
        message: Value,
        details: Option<Value>,
        extra: Option<&Map<String, Value>>,
    ) {
        if self.inner.level_filter.allows(level) {
            self.write(level, message, details, extra);
        }
    }

    /// Write an invocation lifecycle entry. These bypass the level filter.
    pub(crate) fn lifecycle(
        &self,
        level: Level,
        message: impl Serialize,
        details: impl Serialize,
    ) {
        self.write(level, to_json(message), Some(to_json(details)), None);
    }

    fn write(
        &self,
        level: Level,
        message: Value,
        details: Option<Value>,
        extra: Option<&Map<String, Value>>,
    ) {
        let segment = &self.inner.segment;
        let entry = LogEntry {
            level,
            entry: embed(message),
            service_name: segment.name().to_string(),
            segment_id: segment.id().to_string(),
            trace_id: segment.trace_id().to_string(),
            details: details.filter(|d| !d.is_null()).map(embed),
            source: entries::SERVICE_SOURCE.to_string(),
            extra: extra.cloned().unwrap_or_default(),
        };

        self.inner.sink.write(&entry.to_line());
    }

    pub fn error(&self, message: impl Serialize) {
        self.emit(Level::Error, to_json(message), None, None);
    }

    pub fn warn(&self, message: impl Serialize) {
        self.emit(Level::Warn, to_json(message), None, None);
    }

    pub fn info(&self, message: impl Serialize) {
        self.emit(Level::Info, to_json(message), None, None);
    }

    pub fn debug(&self, message: impl Serialize) {
        self.emit(Level::Debug, to_json(message), None, None);
    }

    /// Alias for [`info`](Self::info).
    pub fn log(&self, message: impl Serialize) {
        self.info(message);
    }

    pub fn error_with(&self, message: impl Serialize, details: impl Serialize) {
        self.emit(Level::Error, to_json(message), Some(to_json(details)), None);
    }

    pub fn warn_with(&self, message: impl Serialize, details: impl Serialize) {
        self.emit(Level::Warn, to_json(message), Some(to_json(details)), None);
    }

    pub fn info_with(&self, message: impl Serialize, details: impl Serialize) {
        self.emit(Level::Info, to_json(message), Some(to_json(details)), None);
    }

    pub fn debug_with(&self, message: impl Serialize, details: impl Serialize) {
        self.emit(Level::Debug, to_json(message), Some(to_json(details)), None);
    }

    pub fn log_with(&self, message: impl Serialize, details: impl Serialize) {
        self.info_with(message, details);
    }

    /// Flag the bound segment as failed.
    pub fn mark_error(&self) -> Result<(), TraceError> {
        self.inner.segment.mark_error()
    }

    /// Attach a final metadata entry and close the bound segment.
    ///
    /// Fails with [`TraceError::SegmentClosed`] when called a second time.
    pub fn close(&self, key: &str, value: impl Serialize) -> Result<(), TraceError> {
        let segment = &self.inner.segment;
        segment.add_metadata(key, &to_json(value))?;
        segment.close()
    }

    /// Open a nested segment below this logger's segment and bind a new logger to it.
    ///
    /// The sub-logger inherits annotations, sink, trace service and level filter. It is
    /// closed independently of its parent.
    pub fn create_sub_logger(&self, options: SubLoggerOptions) -> Result<Self, TraceError> {
        let parent = TraceParent::Continue(ParentSegment::of(self.inner.segment.as_ref()));
        Self::open(
            options.segment_name,
            parent,
            options.event,
            self.inner.trace_annotations.clone(),
            self.inner.sink.clone(),
            self.inner.trace_service.clone(),
            self.inner.level_filter,
        )
    }

    /// Logger shaped for the AWS SDK's log hooks.
    pub fn sdk_logger(&self) -> SdkLogAdapter {
        SdkLogAdapter {
            logger: self.clone(),
        }
    }
}

/// Forwards SDK log calls to a [`StructuredLogger`], tagging them `source: aws-sdk`.
#[derive(Debug, Clone)]
pub struct SdkLogAdapter {
    logger: StructuredLogger,
}

impl SdkLogAdapter {
    fn forward(&self, level: Level, value: impl Serialize) {
        let mut extra = Map::new();
        extra.insert(
            "source".to_string(),
            Value::String(entries::SDK_SOURCE.to_string()),
        );
        self.logger.emit(level, to_json(value), None, Some(&extra));
    }

    pub fn error(&self, value: impl Serialize) {
        self.forward(Level::Error, value);
    }

    pub fn warn(&self, value: impl Serialize) {
        self.forward(Level::Warn, value);
    }

    pub fn info(&self, value: impl Serialize) {
        self.forward(Level::Info, value);
    }

    pub fn log(&self, value: impl Serialize) {
        self.forward(Level::Info, value);
    }

    pub fn debug(&self, value: impl Serialize) {
        self.forward(Level::Debug, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySegment, MemoryTraceService};
    use crate::segment::MockTraceService;
    use serde_json::json;
    use serial_test::serial;
    use std::sync::Mutex;

    /// Hands out segments `1`, `2`, ... in trace `xyz` unless a parent trace is given.
    #[derive(Default)]
    struct FixedTraceService {
        created: Mutex<Vec<Arc<MemorySegment>>>,
    }

    impl FixedTraceService {
        fn segment(&self, index: usize) -> Arc<MemorySegment> {
            self.created.lock().unwrap()[index].clone()
        }
    }

    impl TraceService for FixedTraceService {
        fn create_segment(&self, name: &str, parent: &TraceParent) -> Arc<dyn TraceSegment> {
            let mut created = self.created.lock().unwrap();
            let segment = Arc::new(MemorySegment::new(
                name,
                (created.len() + 1).to_string(),
                parent.trace_id().unwrap_or("xyz"),
                parent.segment_id().map(str::to_string),
            ));
            created.push(segment.clone());
            segment
        }
    }

    struct Harness {
        logger: StructuredLogger,
        lines: Arc<Mutex<Vec<String>>>,
        traces: Arc<FixedTraceService>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_filter(LevelFilter::All)
        }

        fn with_filter(level_filter: LevelFilter) -> Self {
            let lines = Arc::new(Mutex::new(Vec::new()));
            let captured = lines.clone();
            let traces = Arc::new(FixedTraceService::default());
            let logger = StructuredLogger::create(
                LoggerConfig::builder()
                    .segment_name("testService")
                    .trace_annotations(Annotations::from([(
                        "team".to_string(),
                        AnnotationValue::from("payments"),
                    )]))
                    .event(json!({"orderId": 42}))
                    .sink(Arc::new(move |line: &str| {
                        captured.lock().unwrap().push(line.to_string())
                    }))
                    .trace_service(traces.clone())
                    .level_filter(level_filter)
                    .build(),
            )
            .unwrap();

            Self {
                logger,
                lines,
                traces,
            }
        }

        fn entries(&self) -> Vec<Value> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }

        fn last(&self) -> Value {
            self.entries().pop().expect("no entries written")
        }
    }

    #[test]
    fn test_log_simple_message() {
        let harness = Harness::new();
        harness.logger.log("sampleMessage");

        let entry = harness.last();
        assert_eq!(entry["entry"], "sampleMessage");
        assert_eq!(entry["level"], "info");
        assert_eq!(entry["service-name"], "testService");
        assert_eq!(entry["segment-id"], "1");
        assert_eq!(entry["trace-id"], "xyz");
        assert_eq!(entry["source"], "service");
        assert!(entry.get("details").is_none());
    }

    #[test]
    fn test_each_level() {
        let harness = Harness::new();
        let cases: [(fn(&StructuredLogger, &str), &str); 4] = [
            (|l, m| l.error(m), "error"),
            (|l, m| l.warn(m), "warn"),
            (|l, m| l.info(m), "info"),
            (|l, m| l.debug(m), "debug"),
        ];

        for (log, level) in cases {
            log(&harness.logger, "message");
            let entry = harness.last();
            assert_eq!(entry["level"], level);
            assert_eq!(entry["segment-id"], "1");
            assert_eq!(entry["trace-id"], "xyz");
        }
    }

    #[test]
    fn test_scalar_details_pass_through() {
        let harness = Harness::new();
        harness.logger.log_with("message", "test details");
        assert_eq!(harness.last()["details"], "test details");
    }

    #[test]
    fn test_structured_details_are_json_text() {
        let harness = Harness::new();
        let details = json!({"key": "value", "nested": [1, 2]});
        harness.logger.info_with("message", &details);

        let entry = harness.last();
        let text = entry["details"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(text).unwrap(), details);
    }

    #[test]
    fn test_structured_messages_are_json_text() {
        let harness = Harness::new();
        harness.logger.log(json!({"key": "value"}));

        let entry = harness.last();
        let parsed: Value = serde_json::from_str(entry["entry"].as_str().unwrap()).unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn test_null_details_are_omitted() {
        let harness = Harness::new();
        harness.logger.info_with("message", Value::Null);
        assert!(harness.last().get("details").is_none());
    }

    #[test]
    fn test_extra_attributes_merge_last() {
        let harness = Harness::new();
        let mut extra = Map::new();
        extra.insert("attr".to_string(), json!("value"));
        extra.insert("source".to_string(), json!("adapter"));

        harness
            .logger
            .emit(Level::Info, json!("message"), None, Some(&extra));

        let entry = harness.last();
        assert_eq!(entry["attr"], "value");
        assert_eq!(entry["source"], "adapter");
        assert_eq!(entry["entry"], "message");
    }

    #[test]
    fn test_level_filter() {
        let harness = Harness::with_filter(LevelFilter::Max(Level::Warn));
        harness.logger.debug("hidden");
        harness.logger.info("hidden");
        harness.logger.warn("shown");
        harness.logger.error("shown");

        let levels: Vec<Value> = harness
            .entries()
            .into_iter()
            .map(|e| e["level"].clone())
            .collect();
        assert_eq!(levels, vec![json!("warn"), json!("error")]);

        let harness = Harness::with_filter(LevelFilter::Off);
        harness.logger.error("hidden");
        assert!(harness.entries().is_empty());

        harness
            .logger
            .lifecycle(Level::Info, "Function started", json!({"k": 1}));
        let entries = harness.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["entry"], "Function started");
    }

    #[test]
    fn test_sub_logger_on_global_tracer_gets_own_segment() {
        let logger = StructuredLogger::create(
            LoggerConfig::builder()
                .segment_name("root")
                .sink(Arc::new(|_: &str| {}))
                .trace_service(Arc::new(crate::OtelTraceService::global()))
                .build(),
        )
        .unwrap();
        let child = logger
            .create_sub_logger(SubLoggerOptions::new("child", Value::Null))
            .unwrap();

        assert_ne!(child.segment().id(), logger.segment().id());
        assert_eq!(child.segment().parent_id(), Some(logger.segment().id()));
        assert_eq!(child.segment().trace_id(), logger.segment().trace_id());
    }

    #[test]
    fn test_creation_records_event_and_annotations() {
        let harness = Harness::new();
        let segment = harness.traces.segment(0);

        assert_eq!(
            segment.metadata_value("Event"),
            Some(json!({"orderId": 42}))
        );
        assert_eq!(
            segment.annotations().get("team"),
            Some(&AnnotationValue::from("payments"))
        );
        assert!(!segment.is_closed());
    }

    #[test]
    fn test_close_appends_metadata_once() {
        let harness = Harness::new();
        harness.logger.close("Result", json!({"ok": true})).unwrap();

        let segment = harness.traces.segment(0);
        assert!(segment.is_closed());
        assert_eq!(segment.metadata().len(), 2);
        assert_eq!(segment.metadata_value("Result"), Some(json!({"ok": true})));

        assert!(harness.logger.close("Result", json!(1)).is_err());
        assert_eq!(segment.metadata().len(), 2);
    }

    #[test]
    fn test_sub_logger_opens_linked_segment() {
        let harness = Harness::new();
        let child = harness
            .logger
            .create_sub_logger(SubLoggerOptions::new("child", json!({"step": 1})))
            .unwrap();

        let root = harness.traces.segment(0);
        let nested = harness.traces.segment(1);
        assert_ne!(nested.id(), root.id());
        assert_eq!(nested.trace_id(), root.trace_id());
        assert_eq!(nested.parent_id(), Some(root.id()));
        assert_eq!(nested.annotations(), root.annotations());
        assert_eq!(nested.metadata_value("Event"), Some(json!({"step": 1})));

        child.info("from child");
        let entry = harness.last();
        assert_eq!(entry["service-name"], "child");
        assert_eq!(entry["segment-id"], "2");
        assert_eq!(entry["trace-id"], "xyz");
    }

    #[test]
    fn test_sub_logger_closes_independently() {
        let harness = Harness::new();
        let child = harness
            .logger
            .create_sub_logger(SubLoggerOptions::new("child", Value::Null))
            .unwrap();

        harness.logger.close("Result", "done").unwrap();
        assert!(harness.traces.segment(0).is_closed());
        assert!(!harness.traces.segment(1).is_closed());

        child.close("Result", "done").unwrap();
        assert!(harness.traces.segment(1).is_closed());

        let harness = Harness::new();
        let child = harness
            .logger
            .create_sub_logger(SubLoggerOptions::new("child", Value::Null))
            .unwrap();
        child.close("Result", "done").unwrap();
        assert!(!harness.traces.segment(0).is_closed());
    }

    #[test]
    fn test_sub_logger_passes_parent_to_trace_service() {
        let mut traces = MockTraceService::new();
        traces
            .expect_create_segment()
            .withf(|name, parent| name == "root" && *parent == TraceParent::NewTrace)
            .times(1)
            .returning(|name, _| {
                Arc::new(MemorySegment::new(name, "a", "t-1", None)) as Arc<dyn TraceSegment>
            });
        traces
            .expect_create_segment()
            .withf(|name, parent| {
                name == "child"
                    && *parent
                        == TraceParent::Continue(ParentSegment {
                            trace_id: "t-1".to_string(),
                            segment_id: "a".to_string(),
                            remote: false,
                        })
            })
            .times(1)
            .returning(|name, parent| {
                Arc::new(MemorySegment::new(
                    name,
                    "b",
                    "t-1",
                    parent.segment_id().map(str::to_string),
                )) as Arc<dyn TraceSegment>
            });

        let logger = StructuredLogger::create(
            LoggerConfig::builder()
                .segment_name("root")
                .sink(Arc::new(|_: &str| {}))
                .trace_service(Arc::new(traces))
                .build(),
        )
        .unwrap();
        let child = logger
            .create_sub_logger(SubLoggerOptions::builder().segment_name("child").build())
            .unwrap();

        assert_eq!(child.segment().parent_id(), Some("a"));
    }

    #[test]
    fn test_sdk_adapter_tags_source() {
        let harness = Harness::new();
        let sdk = harness.logger.sdk_logger();
        sdk.log("[AWS s3 200 0.05s] getObject");
        sdk.error("throttled");

        let entries = harness.entries();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry["source"], "aws-sdk");
            assert!(entry.get("details").is_none());
        }
        assert_eq!(entries[0]["level"], "info");
        assert_eq!(entries[1]["level"], "error");
    }

    #[test]
    fn test_memory_backend_links_segments() {
        let traces = MemoryTraceService::new();
        let logger = StructuredLogger::create(
            LoggerConfig::builder()
                .segment_name("root")
                .sink(Arc::new(|_: &str| {}))
                .trace_service(Arc::new(traces.clone()))
                .build(),
        )
        .unwrap();
        let child = logger
            .create_sub_logger(SubLoggerOptions::new("child", Value::Null))
            .unwrap();

        let root = traces.find("root").unwrap();
        let nested = traces.find("child").unwrap();
        assert_eq!(nested.trace_id(), root.trace_id());
        assert_eq!(child.segment().parent_id(), Some(root.id()));
    }

    #[test]
    #[serial]
    fn test_level_filter_from_env() {
        env::remove_var(env_vars::LOG_LEVEL);
        env::set_var(env_vars::AWS_LAMBDA_LOG_LEVEL, "WARN");
        assert_eq!(LevelFilter::from_env(), Some(LevelFilter::Max(Level::Warn)));

        env::set_var(env_vars::AWS_LAMBDA_LOG_LEVEL, "bogus");
        assert_eq!(LevelFilter::from_env(), None);

        env::remove_var(env_vars::AWS_LAMBDA_LOG_LEVEL);
        env::set_var(env_vars::LOG_LEVEL, "none");
        assert_eq!(LevelFilter::from_env(), Some(LevelFilter::Off));

        env::remove_var(env_vars::LOG_LEVEL);
        assert_eq!(LevelFilter::from_env(), None);
    }
}
