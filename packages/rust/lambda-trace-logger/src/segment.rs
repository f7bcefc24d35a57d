//! Trace segment abstractions.
//!
//! A [`TraceSegment`] is one timed unit of work inside a distributed trace. Segments are
//! minted by a [`TraceService`], which is the only seam between the logging core and the
//! tracing backend that eventually stores or exports them.
//!
//! Two backends ship with this crate:
//!
//! - [`MemoryTraceService`](crate::MemoryTraceService): keeps segments in process, handy for
//!   tests and local runs
//! - [`OtelTraceService`](crate::OtelTraceService): maps segments onto OpenTelemetry spans
//!
//! # Lifecycle
//!
//! A segment is created open, receives annotations and metadata while the unit of work runs,
//! and is closed exactly once. Every mutation after close fails with
//! [`TraceError::SegmentClosed`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by segment backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    #[error("segment {id} is already closed")]
    SegmentClosed { id: String },
}

/// Scalar value attached to a segment as an indexable annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AnnotationValue {
    /// Parse a raw configuration string, typing booleans and numbers.
    pub fn parse(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return AnnotationValue::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return AnnotationValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return AnnotationValue::Float(f);
        }
        AnnotationValue::String(raw.to_string())
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Bool(b) => write!(f, "{}", b),
            AnnotationValue::Int(i) => write!(f, "{}", i),
            AnnotationValue::Float(x) => write!(f, "{}", x),
            AnnotationValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for AnnotationValue {
    fn from(value: &str) -> Self {
        AnnotationValue::String(value.to_string())
    }
}

impl From<String> for AnnotationValue {
    fn from(value: String) -> Self {
        AnnotationValue::String(value)
    }
}

impl From<bool> for AnnotationValue {
    fn from(value: bool) -> Self {
        AnnotationValue::Bool(value)
    }
}

impl From<i64> for AnnotationValue {
    fn from(value: i64) -> Self {
        AnnotationValue::Int(value)
    }
}

impl From<i32> for AnnotationValue {
    fn from(value: i32) -> Self {
        AnnotationValue::Int(value.into())
    }
}

impl From<u32> for AnnotationValue {
    fn from(value: u32) -> Self {
        AnnotationValue::Int(value.into())
    }
}

impl From<f64> for AnnotationValue {
    fn from(value: f64) -> Self {
        AnnotationValue::Float(value)
    }
}

/// Identity of a segment that a new segment should be parented to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentSegment {
    /// Trace shared by every segment of the logical request.
    pub trace_id: String,
    /// Id of the parent segment inside that trace.
    pub segment_id: String,
    /// `true` when the parent lives in another process.
    pub remote: bool,
}

impl ParentSegment {
    /// Parent received from an upstream caller.
    pub fn new(trace_id: impl Into<String>, segment_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            segment_id: segment_id.into(),
            remote: true,
        }
    }

    /// Parent details of an existing segment, used when opening nested segments.
    pub fn of(segment: &dyn TraceSegment) -> Self {
        Self {
            remote: false,
            ..Self::new(segment.trace_id(), segment.id())
        }
    }
}

/// Where a new segment sits in the trace tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TraceParent {
    /// Start a brand new trace rooted at the new segment.
    #[default]
    NewTrace,
    /// Join an existing trace below the given segment.
    Continue(ParentSegment),
}

impl TraceParent {
    /// Continue when both ids are present, otherwise start a new trace.
    pub fn from_ids(trace_id: Option<&str>, segment_id: Option<&str>) -> Self {
        match (trace_id, segment_id) {
            (Some(trace_id), Some(segment_id)) if !trace_id.is_empty() && !segment_id.is_empty() => {
                TraceParent::Continue(ParentSegment::new(trace_id, segment_id))
            }
            _ => TraceParent::NewTrace,
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        match self {
            TraceParent::NewTrace => None,
            TraceParent::Continue(parent) => Some(&parent.trace_id),
        }
    }

    pub fn segment_id(&self) -> Option<&str> {
        match self {
            TraceParent::NewTrace => None,
            TraceParent::Continue(parent) => Some(&parent.segment_id),
        }
    }
}

/// One unit of traced work.
///
/// Implementations use interior mutability so a segment can be shared behind an `Arc`
/// between the logger that owns it and whoever inspects it.
pub trait TraceSegment: Send + Sync {
    /// Function or service name.
    fn name(&self) -> &str;

    /// Id unique within the trace.
    fn id(&self) -> &str;

    /// Id shared by all segments of the trace.
    fn trace_id(&self) -> &str;

    /// Id of the parent segment, if any.
    fn parent_id(&self) -> Option<&str>;

    /// Attach an indexable key/value pair.
    fn add_annotation(&self, key: &str, value: &AnnotationValue) -> Result<(), TraceError>;

    /// Append an unindexed metadata entry.
    fn add_metadata(&self, key: &str, value: &Value) -> Result<(), TraceError>;

    /// Flag the segment as failed.
    fn mark_error(&self) -> Result<(), TraceError>;

    /// Close the segment. Fails if it was closed before.
    fn close(&self) -> Result<(), TraceError>;

    fn is_closed(&self) -> bool;
}

/// Factory for trace segments.
#[cfg_attr(test, mockall::automock)]
pub trait TraceService: Send + Sync {
    /// Mint a new segment named `name` below `parent`.
    fn create_segment(&self, name: &str, parent: &TraceParent) -> Arc<dyn TraceSegment>;
}
