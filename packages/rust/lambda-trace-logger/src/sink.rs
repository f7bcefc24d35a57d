//! Destinations for serialized log entries.

use std::io::Write;

/// Receives one pre-serialized log entry per call.
///
/// Any `Fn(&str) + Send + Sync` closure is a sink, which is how tests capture output:
///
/// ```
/// use lambda_trace_logger::LogSink;
/// use std::sync::{Arc, Mutex};
///
/// let lines = Arc::new(Mutex::new(Vec::<String>::new()));
/// let captured = lines.clone();
/// let sink = move |line: &str| captured.lock().unwrap().push(line.to_string());
///
/// sink.write("{}");
/// assert_eq!(lines.lock().unwrap().len(), 1);
/// ```
pub trait LogSink: Send + Sync {
    fn write(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn write(&self, line: &str) {
        self(line)
    }
}

/// Writes every entry to standard output, where the Lambda platform picks it up.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = writeln!(handle, "{}", line) {
            tracing::warn!(error = %e, "failed to write log entry to stdout");
        }
    }
}
