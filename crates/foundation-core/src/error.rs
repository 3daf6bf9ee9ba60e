//! Process-wide error taxonomy, thread-local last-error slot, and the
//! per-thread error-context LIFO.
//!
//! Mirrors the allocator's lifecycle-logging idiom: structured records
//! rather than bare panics, so a host application can inspect what went
//! wrong without unwinding.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Closed set of error kinds. Not `#[non_exhaustive]` — the set is closed
/// by design, adding a kind is a deliberate API change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    None,
    InvalidValue,
    Unsupported,
    NotImplemented,
    OutOfMemory,
    InternalFailure,
    MallocFailure,
    MemoryLeak,
    AccessDenied,
    Exception,
    SystemCallFail,
    Script,
    UnknownType,
    UnknownResource,
    MemoryAlignment,
    Deprecated,
    Assert,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Severity, ordered so callers can filter "at least Warning".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    None,
    Debug,
    Info,
    Warning,
    Error,
    Panic,
}

/// One frame of the per-thread error-context LIFO: a name and a free-form
/// data string attached by the caller when the frame was pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFrame {
    pub name: String,
    pub data: String,
}

/// A reported error, snapshotting the context stack at the moment of report.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub context_frames: Vec<ContextFrame>,
}

/// What the process-wide handler decides to do with a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    Continue,
    Abort,
}

type ErrorHandler = Box<dyn Fn(&ErrorRecord) -> HandlerAction + Send + Sync>;

static GLOBAL_HANDLER: OnceLock<Mutex<Option<ErrorHandler>>> = OnceLock::new();

fn handler_slot() -> &'static Mutex<Option<ErrorHandler>> {
    GLOBAL_HANDLER.get_or_init(|| Mutex::new(None))
}

/// Install a process-wide error handler. Replaces any previously installed
/// handler (no `fini`/`init` handoff here — unlike the tracker and log sink,
/// the error handler has no teardown obligations).
pub fn set_handler<F>(handler: F)
where
    F: Fn(&ErrorRecord) -> HandlerAction + Send + Sync + 'static,
{
    *handler_slot().lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(handler));
}

/// Remove the process-wide error handler, if any.
pub fn clear_handler() {
    *handler_slot().lock().unwrap_or_else(|e| e.into_inner()) = None;
}

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorRecord>> = const { RefCell::new(None) };
    static CONTEXT_STACK: RefCell<Vec<ContextFrame>> = const { RefCell::new(Vec::new()) };
}

/// Maximum depth of the per-thread error-context stack, matching the
/// `error_context_depth` configuration key's upper bound.
pub const MAX_CONTEXT_DEPTH: usize = 32;

/// Push a context frame. Saturates silently past [`MAX_CONTEXT_DEPTH`].
pub fn context_push(name: impl Into<String>, data: impl Into<String>) {
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() < MAX_CONTEXT_DEPTH {
            stack.push(ContextFrame {
                name: name.into(),
                data: data.into(),
            });
        }
    });
}

/// Pop the most recently pushed context frame, if any.
pub fn context_pop() -> Option<ContextFrame> {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().pop())
}

/// Snapshot the current thread's error-context stack, bottom to top.
pub fn error_context_buffer() -> Vec<ContextFrame> {
    CONTEXT_STACK.with(|stack| stack.borrow().clone())
}

/// Clear the current thread's error-context stack. Called after a caught
/// fault returns control to the captured frame.
pub fn context_clear() {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().clear());
}

/// RAII guard that pops its context frame on drop — the idiomatic-Rust
/// improvement over the original's manual push/pop pairing.
pub struct ContextGuard {
    _private: (),
}

impl ContextGuard {
    /// Push a frame and return a guard that pops it when dropped.
    pub fn push(name: impl Into<String>, data: impl Into<String>) -> Self {
        context_push(name, data);
        ContextGuard { _private: () }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        context_pop();
    }
}

/// Report an error: stash it in the thread-local last-error slot, snapshot
/// the context stack into the record, forward to the log sink at `Warning`
/// or above, and consult the process-wide handler.
///
/// Returns the handler's decision, or `Continue` if no handler is installed.
pub fn error_report(kind: ErrorKind, severity: Severity, message: impl Into<String>) -> HandlerAction {
    let record = ErrorRecord {
        kind,
        severity,
        message: message.into(),
        context_frames: error_context_buffer(),
    };

    if severity >= Severity::Warning {
        crate::log::log_error_record(&record);
    }

    let action = {
        let guard = handler_slot().lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(handler) => handler(&record),
            None => HandlerAction::Continue,
        }
    };

    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(record));
    action
}

/// Retrieve a clone of the last error reported on this thread, if any.
pub fn last_error() -> Option<ErrorRecord> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clear the last-error slot for the current thread.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_push_pop_round_trips() {
        context_clear();
        context_push("alloc", "size=64");
        context_push("stream", "path=buffer://x");
        assert_eq!(error_context_buffer().len(), 2);
        let top = context_pop().unwrap();
        assert_eq!(top.name, "stream");
        let bottom = context_pop().unwrap();
        assert_eq!(bottom.name, "alloc");
        assert!(context_pop().is_none());
    }

    #[test]
    fn context_guard_pops_on_drop() {
        context_clear();
        {
            let _g = ContextGuard::push("scope", "x");
            assert_eq!(error_context_buffer().len(), 1);
        }
        assert_eq!(error_context_buffer().len(), 0);
    }

    #[test]
    fn context_depth_saturates() {
        context_clear();
        for i in 0..(MAX_CONTEXT_DEPTH + 10) {
            context_push(format!("frame{i}"), "");
        }
        assert_eq!(error_context_buffer().len(), MAX_CONTEXT_DEPTH);
        context_clear();
    }

    #[test]
    fn error_report_populates_last_error() {
        clear_last_error();
        error_report(ErrorKind::OutOfMemory, Severity::Panic, "alloc failed");
        let last = last_error().expect("last error should be set");
        assert_eq!(last.kind, ErrorKind::OutOfMemory);
        assert_eq!(last.severity, Severity::Panic);
    }

    #[test]
    fn handler_can_request_abort() {
        set_handler(|_record| HandlerAction::Abort);
        let action = error_report(ErrorKind::Assert, Severity::Error, "bad");
        assert_eq!(action, HandlerAction::Abort);
        clear_handler();
    }

    #[test]
    fn severity_ordering_filters_warnings() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning >= Severity::Warning);
        assert!(Severity::Debug < Severity::Info);
    }
}
