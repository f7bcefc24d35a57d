//! OpenTelemetry trace backend.
//!
//! [`OtelTraceService`] turns every segment into an OpenTelemetry span. Export is left to
//! whichever tracer provider produced the tracer (see [`init_telemetry`](crate::init_telemetry)).
//!
//! # Mapping
//!
//! | Segment operation | Span operation |
//! |---|---|
//! | parent `Continue` | remote parent [`SpanContext`] |
//! | `add_annotation` | span attribute |
//! | `add_metadata` | span event named after the key, JSON `value` attribute |
//! | `mark_error` | `Status::error` |
//! | `close` | `end()` |
//!
//! Segments report the caller's trace id verbatim, so log lines join with upstream logs on
//! `trace-id`. Span linkage parses that id in X-Ray form (`1-5759e988-bd862e3fe1be46a994272793`)
//! or as 32 hex digits. Ids in any other shape map to a stable derived span context, so every
//! segment of the same logical trace still lands in one OpenTelemetry trace.
//!
//! Segments continuing a caller's trace, and new roots, are `Server` spans. Nested segments are
//! `Internal`.

use crate::segment::{
    AnnotationValue, ParentSegment, TraceError, TraceParent, TraceSegment, TraceService,
};
use opentelemetry::trace::{
    Span, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceFlags, TraceId, TraceState,
    Tracer,
};
use opentelemetry::{global, Context, KeyValue};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Trace service backed by an OpenTelemetry tracer.
#[derive(Debug, Clone)]
pub struct OtelTraceService<T = global::BoxedTracer> {
    tracer: T,
}

impl OtelTraceService<global::BoxedTracer> {
    /// Use the globally registered tracer provider.
    pub fn global() -> Self {
        Self::new(global::tracer(env!("CARGO_PKG_NAME")))
    }
}

impl<T> OtelTraceService<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    pub fn new(tracer: T) -> Self {
        Self { tracer }
    }

    fn parent_context(parent: &TraceParent) -> (Context, SpanKind) {
        match parent {
            TraceParent::NewTrace => (Context::new(), SpanKind::Server),
            TraceParent::Continue(parent) => {
                let cx = Context::new().with_remote_span_context(link_span_context(parent));
                let kind = if parent.remote {
                    SpanKind::Server
                } else {
                    SpanKind::Internal
                };
                (cx, kind)
            }
        }
    }
}

impl<T> TraceService for OtelTraceService<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    fn create_segment(&self, name: &str, parent: &TraceParent) -> Arc<dyn TraceSegment> {
        let (parent_cx, kind) = Self::parent_context(parent);
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_kind(kind)
            .start_with_context(&self.tracer, &parent_cx);

        let span_context = span.span_context().clone();
        let parent_span_id = parent_cx.span().span_context().span_id();

        // Tracers without a provider hand back an invalid context for roots and the parent's
        // own context for children.
        let id = if span_context.is_valid() && span_context.span_id() != parent_span_id {
            span_context.span_id().to_string()
        } else {
            format!("{:016x}", rand::random::<u64>())
        };
        let trace_id = match parent {
            TraceParent::Continue(parent) => parent.trace_id.clone(),
            TraceParent::NewTrace if span_context.is_valid() => span_context.trace_id().to_string(),
            TraceParent::NewTrace => format!("{:032x}", rand::random::<u128>()),
        };

        tracing::debug!(
            segment.name = name,
            segment.id = %id,
            trace.id = %trace_id,
            "created span segment"
        );

        Arc::new(OtelSegment {
            name: name.to_string(),
            id,
            trace_id,
            parent_id: parent.segment_id().map(str::to_string),
            state: Mutex::new(SpanState {
                span,
                closed: false,
            }),
        })
    }
}

struct SpanState<S> {
    span: S,
    closed: bool,
}

/// Segment backed by an OpenTelemetry span.
pub struct OtelSegment<S> {
    name: String,
    id: String,
    trace_id: String,
    parent_id: Option<String>,
    state: Mutex<SpanState<S>>,
}

impl<S: Span> OtelSegment<S> {
    fn open_state(&self) -> Result<MutexGuard<'_, SpanState<S>>, TraceError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(TraceError::SegmentClosed {
                id: self.id.clone(),
            });
        }
        Ok(state)
    }
}

impl<S> TraceSegment for OtelSegment<S>
where
    S: Span + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn add_annotation(&self, key: &str, value: &AnnotationValue) -> Result<(), TraceError> {
        let key = key.to_string();
        let attribute = match value {
            AnnotationValue::Bool(b) => KeyValue::new(key, *b),
            AnnotationValue::Int(i) => KeyValue::new(key, *i),
            AnnotationValue::Float(f) => KeyValue::new(key, *f),
            AnnotationValue::String(s) => KeyValue::new(key, s.clone()),
        };
        self.open_state()?.span.set_attribute(attribute);
        Ok(())
    }

    fn add_metadata(&self, key: &str, value: &Value) -> Result<(), TraceError> {
        self.open_state()?.span.add_event(
            key.to_string(),
            vec![KeyValue::new("value", value.to_string())],
        );
        Ok(())
    }

    fn mark_error(&self) -> Result<(), TraceError> {
        self.open_state()?
            .span
            .set_status(Status::error("segment marked as failed"));
        Ok(())
    }

    fn close(&self) -> Result<(), TraceError> {
        let mut state = self.open_state()?;
        state.span.end();
        state.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}

/// Sampled remote span context standing in for `parent`.
fn link_span_context(parent: &ParentSegment) -> SpanContext {
    let trace_id = TraceId::from_hex(&normalize_trace_id(&parent.trace_id))
        .ok()
        .filter(|id| *id != TraceId::INVALID)
        .unwrap_or_else(|| {
            tracing::debug!(trace.id = %parent.trace_id, "deriving span trace id");
            TraceId::from(fnv1a_128(&parent.trace_id).max(1))
        });
    let span_id = SpanId::from_hex(&parent.segment_id)
        .ok()
        .filter(|id| *id != SpanId::INVALID)
        .unwrap_or_else(|| SpanId::from(fnv1a_64(&parent.segment_id).max(1)));

    SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::SAMPLED,
        parent.remote,
        TraceState::default(),
    )
}

/// `1-5759e988-bd862e3fe1be46a994272793` becomes `5759e988bd862e3fe1be46a994272793`.
fn normalize_trace_id(trace_id: &str) -> String {
    match trace_id.strip_prefix("1-") {
        Some(rest) => rest.replace('-', ""),
        None => trace_id.to_string(),
    }
}

fn fnv1a_128(value: &str) -> u128 {
    const OFFSET: u128 = 0x6c62272e07bb014262b821756295c58d;
    const PRIME: u128 = 0x0000000001000000000000000000013b;
    value
        .bytes()
        .fold(OFFSET, |hash, b| (hash ^ u128::from(b)).wrapping_mul(PRIME))
}

fn fnv1a_64(value: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    value
        .bytes()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
