//! Structured JSONL logging sink.
//!
//! Canonical record is [`LogEntry`]; the process-wide [`LogSink`] is a
//! swappable trait object behind a `Mutex`, following the same
//! outgoing-`fini`-then-incoming-`init` discipline as the memory tracker's
//! `set_tracker`.

use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ContextFrame, ErrorRecord, Severity};

/// Log severity. Distinct from [`crate::error::Severity`] because a sink may
/// want to log at levels (`Trace`, `Debug`) that never correspond to a
/// reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl From<Severity> for LogLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::None | Severity::Debug => LogLevel::Debug,
            Severity::Info => LogLevel::Info,
            Severity::Warning => LogLevel::Warn,
            Severity::Error => LogLevel::Error,
            Severity::Panic => LogLevel::Fatal,
        }
    }
}

/// Canonical structured log entry. `fields` carries free-form key/value
/// context (allocation sizes, event counts, context frames, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub trace_id: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        LogEntry {
            timestamp: unix_timestamp_rfc3339_like(),
            level,
            trace_id: String::new(),
            target: target.into(),
            message: message.into(),
            fields: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Seconds-since-epoch timestamp. Foundation-core has no chrono dependency;
/// this is adequate for JSONL correlation and is monotonic enough for
/// cross-process comparison within a second's resolution.
fn unix_timestamp_rfc3339_like() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", now.as_secs(), now.subsec_nanos())
}

/// A process-wide logging destination. `emit` must not panic; sinks that
/// can fail (file I/O) should swallow the error rather than poison the
/// caller's control flow.
pub trait LogSink: Send + Sync {
    fn emit(&self, entry: &LogEntry);

    /// Called once, immediately after the sink becomes the active sink.
    fn init(&self) {}

    /// Called once, immediately before the sink is replaced.
    fn fini(&self) {}
}

/// Default sink: one JSONL line per entry, written to stderr.
pub struct StderrSink;

impl LogSink for StderrSink {
    fn emit(&self, entry: &LogEntry) {
        if let Ok(line) = serde_json::to_string(entry) {
            let _ = writeln!(std::io::stderr(), "{line}");
        }
    }
}

static ACTIVE_SINK: OnceLock<Mutex<Box<dyn LogSink>>> = OnceLock::new();

fn active_sink() -> &'static Mutex<Box<dyn LogSink>> {
    ACTIVE_SINK.get_or_init(|| {
        let sink: Box<dyn LogSink> = Box::new(StderrSink);
        sink.init();
        Mutex::new(sink)
    })
}

/// Swap the process-wide sink. The outgoing sink's `fini` runs before the
/// incoming sink's `init`.
pub fn set_sink(sink: Box<dyn LogSink>) {
    let slot = active_sink();
    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    guard.fini();
    sink.init();
    *guard = sink;
}

/// Emit an entry through the active sink.
pub fn emit(entry: LogEntry) {
    let guard = active_sink().lock().unwrap_or_else(|e| e.into_inner());
    guard.emit(&entry);
}

pub fn info(target: &str, message: impl Into<String>) {
    emit(LogEntry::new(LogLevel::Info, target, message));
}

pub fn warn(target: &str, message: impl Into<String>) {
    emit(LogEntry::new(LogLevel::Warn, target, message));
}

pub fn error(target: &str, message: impl Into<String>) {
    emit(LogEntry::new(LogLevel::Error, target, message));
}

/// Bridge an [`ErrorRecord`] into the log sink, carrying its context frames
/// as structured `fields`.
pub(crate) fn log_error_record(record: &ErrorRecord) {
    let frames: Vec<Value> = record
        .context_frames
        .iter()
        .map(|ContextFrame { name, data }| {
            serde_json::json!({ "name": name, "data": data })
        })
        .collect();

    let entry = LogEntry::new(record.severity.into(), "foundation::error", record.message.clone())
        .with_fields(serde_json::json!({
            "kind": format!("{:?}", record.kind),
            "context": frames,
        }));
    emit(entry);
}
