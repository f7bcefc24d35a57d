//! Trace continuation from inbound events.
//!
//! Upstream callers continue a trace by sending two headers with the event: the trace id and
//! the id of the calling segment. Where those headers live on the event depends on the
//! integration (API Gateway puts them under `headers`, some mapping templates under
//! `params.header`), so the location is described by a [`HeaderMapping`].
//!
//! When the event carries no continuation headers, the Lambda X-Ray header
//! (`Root=...;Parent=...;Sampled=1`) can be used instead. It is read from the invocation
//! context first and from the `_X_AMZN_TRACE_ID` environment variable after that.

use crate::constants::defaults;
use crate::segment::{ParentSegment, TraceParent};
use serde_json::Value;
use std::env;

const XRAY_ENV_VAR: &str = "_X_AMZN_TRACE_ID";

/// Where the trace continuation headers live on an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMapping {
    /// Dotted path from the event root to the headers object.
    pub path: String,
    pub trace_id_header: String,
    pub parent_segment_header: String,
}

impl Default for HeaderMapping {
    fn default() -> Self {
        Self {
            path: defaults::HEADER_PATH.to_string(),
            trace_id_header: defaults::TRACE_ID_HEADER.to_string(),
            parent_segment_header: defaults::PARENT_SEGMENT_HEADER.to_string(),
        }
    }
}

impl HeaderMapping {
    /// Mapping with the default header names below a custom path.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// The headers object on `event`, if the path resolves to one.
    fn headers<'a>(&self, event: &'a Value) -> Option<&'a serde_json::Map<String, Value>> {
        self.path
            .split('.')
            .filter(|part| !part.is_empty())
            .try_fold(event, |value, part| value.get(part))?
            .as_object()
    }

    /// Read one header, ignoring case. Multi-value headers yield their first value.
    fn header<'a>(&self, event: &'a Value, name: &str) -> Option<&'a str> {
        let value = self
            .headers(event)?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)?;

        match value {
            Value::String(s) => Some(s.as_str()),
            Value::Array(values) => values.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Continue the upstream trace when both headers are present.
    pub fn trace_parent(&self, event: &Value) -> TraceParent {
        TraceParent::from_ids(
            self.header(event, &self.trace_id_header),
            self.header(event, &self.parent_segment_header),
        )
    }
}

/// Parse an X-Ray trace header (`Root=1-...;Parent=...;Sampled=1`).
///
/// Returns `None` unless both `Root` and `Parent` are present and non-empty.
pub fn parse_xray_header(header: &str) -> Option<ParentSegment> {
    let mut root = None;
    let mut parent = None;

    for part in header.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "Root" => root = Some(value.trim()),
            "Parent" => parent = Some(value.trim()),
            _ => {}
        }
    }

    match (root, parent) {
        (Some(root), Some(parent)) if !root.is_empty() && !parent.is_empty() => {
            Some(ParentSegment::new(root, parent))
        }
        _ => None,
    }
}

/// Parent from the Lambda X-Ray header, falling back to `_X_AMZN_TRACE_ID`.
pub fn lambda_trace_parent(context_header: Option<&str>) -> TraceParent {
    if let Some(parent) = context_header.and_then(parse_xray_header) {
        return TraceParent::Continue(parent);
    }

    match env::var(XRAY_ENV_VAR) {
        Ok(header) => match parse_xray_header(&header) {
            Some(parent) => {
                tracing::debug!(header = %header, "continuing trace from {}", XRAY_ENV_VAR);
                TraceParent::Continue(parent)
            }
            None => TraceParent::NewTrace,
        },
        Err(_) => TraceParent::NewTrace,
    }
}
