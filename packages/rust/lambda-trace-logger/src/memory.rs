//! In-process trace backend.
//!
//! [`MemoryTraceService`] mints segments with X-Ray shaped ids and keeps every segment it
//! created, so the full trace tree of an invocation can be inspected after the fact.
//! Nothing is exported anywhere.

use crate::segment::{AnnotationValue, TraceError, TraceParent, TraceSegment, TraceService};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata entry appended to a segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Default)]
struct SegmentState {
    annotations: BTreeMap<String, AnnotationValue>,
    metadata: Vec<MetadataEntry>,
    error: bool,
    closed: bool,
}

/// Segment recorded in memory.
#[derive(Debug)]
pub struct MemorySegment {
    name: String,
    id: String,
    trace_id: String,
    parent_id: Option<String>,
    state: Mutex<SegmentState>,
}

impl MemorySegment {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        trace_id: impl Into<String>,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            trace_id: trace_id.into(),
            parent_id,
            state: Mutex::new(SegmentState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SegmentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_state(&self) -> Result<MutexGuard<'_, SegmentState>, TraceError> {
        let state = self.state();
        if state.closed {
            return Err(TraceError::SegmentClosed {
                id: self.id.clone(),
            });
        }
        Ok(state)
    }

    /// Snapshot of the metadata entries, in insertion order.
    pub fn metadata(&self) -> Vec<MetadataEntry> {
        self.state().metadata.clone()
    }

    /// Value of the last metadata entry stored under `key`.
    pub fn metadata_value(&self, key: &str) -> Option<Value> {
        self.state()
            .metadata
            .iter()
            .rev()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.clone())
    }

    pub fn annotations(&self) -> BTreeMap<String, AnnotationValue> {
        self.state().annotations.clone()
    }

    pub fn is_error(&self) -> bool {
        self.state().error
    }
}

impl TraceSegment for MemorySegment {
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
        self.open_state()?
            .annotations
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn add_metadata(&self, key: &str, value: &Value) -> Result<(), TraceError> {
        self.open_state()?.metadata.push(MetadataEntry {
            key: key.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    fn mark_error(&self) -> Result<(), TraceError> {
        self.open_state()?.error = true;
        Ok(())
    }

    fn close(&self) -> Result<(), TraceError> {
        self.open_state()?.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// Trace service that records every segment it creates.
///
/// Cloning is cheap and clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceService {
    segments: Arc<Mutex<Vec<Arc<MemorySegment>>>>,
}

impl MemoryTraceService {
    pub fn new() -> Self {
        Self::default()
    }

    /// All segments created so far, in creation order.
    pub fn segments(&self) -> Vec<Arc<MemorySegment>> {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First segment created with the given name.
    pub fn find(&self, name: &str) -> Option<Arc<MemorySegment>> {
        self.segments().into_iter().find(|s| s.name == name)
    }
}

impl TraceService for MemoryTraceService {
    fn create_segment(&self, name: &str, parent: &TraceParent) -> Arc<dyn TraceSegment> {
        let trace_id = parent
            .trace_id()
            .map(str::to_string)
            .unwrap_or_else(new_trace_id);
        let segment = Arc::new(MemorySegment::new(
            name,
            new_segment_id(),
            trace_id,
            parent.segment_id().map(str::to_string),
        ));

        tracing::debug!(
            segment.name = name,
            segment.id = segment.id(),
            trace.id = segment.trace_id(),
            "created in-memory segment"
        );

        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(segment.clone());
        segment
    }
}

/// X-Ray trace id: version, epoch seconds and 96 random bits.
fn new_trace_id() -> String {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let random = rand::random::<u128>() & ((1u128 << 96) - 1);
    format!("1-{:08x}-{:024x}", epoch as u32, random)
}

fn new_segment_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
