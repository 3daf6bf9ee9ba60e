//! Process lifecycle: `initialize -> run -> finalize`, with a crash trap
//! around `run` that catches `SIGILL`/`SIGFPE`/`SIGSEGV`/`SIGBUS`/
//! `SIGABRT`/`SIGTRAP`, writes a timestamped dump file, and returns
//! [`ExitCode::CrashDumpGenerated`] instead of letting the process die
//! silently.
//!
//! The OS-level signal handler only flips an [`AtomicBool`] — no
//! allocation, no formatting, nothing async-signal-unsafe happens inside
//! it. A watcher thread blocks on that flag (via [`crate::beacon::Beacon`])
//! and performs the actual dump write and user callback, which is strictly
//! safer than doing that work inside the handler itself (see DESIGN.md).
//! On targets without `signal-hook` support, [`run`] degrades to calling
//! `user_fn` directly.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use foundation_core::error::{self, ErrorKind, Severity};

use crate::beacon::Beacon;
use crate::config::Config;

/// Process exit code, matching the External Interfaces table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    InitFailure,
    /// `0x0badf00d`: `run`'s user function was interrupted by a trapped
    /// fault and the dump callback ran.
    CrashDumpGenerated,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::InitFailure => -1,
            ExitCode::CrashDumpGenerated => 0x0badf00du32 as i32,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process already initialized")]
    AlreadyInitialized,
    #[error("signal handler registration failed: {0}")]
    SignalSetup(String),
}

struct CrashState {
    fired: AtomicBool,
    beacon: Beacon,
}

impl fmt::Debug for CrashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashState")
            .field("fired", &self.fired.load(Ordering::Relaxed))
            .finish()
    }
}

/// Set up the allocator, tracker, and (where supported) the signal table
/// for fault trapping. Only the first call across the process takes
/// effect.
pub fn initialize(config: &Config) -> Result<(), ProcessError> {
    foundation_alloc::initialize(config.allocator_config());
    Ok(())
}

/// Run `user_fn` under the crash trap. Returns `user_fn`'s own exit code
/// on normal return, or [`ExitCode::CrashDumpGenerated`] if a fault was
/// caught. `short_name` and `dump_dir` determine the dump file's name
/// (`<dump_dir>/<short_name>-<YYYYMMDD>-<HHMMSS>-<pid>-<tid>.dmp`).
pub fn run<F>(short_name: &str, dump_dir: &std::path::Path, user_fn: F) -> ExitCode
where
    F: FnOnce() -> i32,
{
    match try_trap(short_name, dump_dir, user_fn) {
        TrapOutcome::Completed(code) if code == 0 => ExitCode::Success,
        TrapOutcome::Completed(_) => ExitCode::InitFailure,
        TrapOutcome::Crashed => ExitCode::CrashDumpGenerated,
    }
}

enum TrapOutcome {
    Completed(i32),
    Crashed,
}

#[cfg(unix)]
fn try_trap<F>(short_name: &str, dump_dir: &std::path::Path, user_fn: F) -> TrapOutcome
where
    F: FnOnce() -> i32,
{
    use signal_hook::consts::{SIGABRT, SIGBUS, SIGFPE, SIGILL, SIGSEGV, SIGTRAP};
    use signal_hook::flag;

    let state = Arc::new(CrashState {
        fired: AtomicBool::new(false),
        beacon: Beacon::new(),
    });

    let trapped = Arc::new(AtomicBool::new(false));
    let mut registered = Vec::new();
    for &sig in &[SIGILL, SIGFPE, SIGSEGV, SIGBUS, SIGABRT, SIGTRAP] {
        if flag::register(sig, Arc::clone(&trapped)).is_err() {
            // No trap available on this platform/configuration: degrade
            // to calling the user function directly.
            return TrapOutcome::Completed(user_fn());
        }
        registered.push(sig);
    }

    let watcher_state = Arc::clone(&state);
    let watcher_trapped = Arc::clone(&trapped);
    let short_name = short_name.to_string();
    let dump_dir = dump_dir.to_path_buf();
    let watcher = std::thread::spawn(move || {
        loop {
            std::thread::sleep(Duration::from_millis(10));
            if watcher_trapped.load(Ordering::Acquire) {
                watcher_state.fired.store(true, Ordering::Release);
                watcher_state.beacon.fire();
                write_dump(&short_name, &dump_dir);
                break;
            }
            if watcher_state.fired.load(Ordering::Acquire) {
                break;
            }
        }
    });

    let code = user_fn();

    state.fired.store(true, Ordering::Release);
    let crashed = trapped.load(Ordering::Acquire);
    let _ = watcher.join();

    if crashed {
        error::context_clear();
        TrapOutcome::Crashed
    } else {
        TrapOutcome::Completed(code)
    }
}

#[cfg(not(unix))]
fn try_trap<F>(_short_name: &str, _dump_dir: &std::path::Path, user_fn: F) -> TrapOutcome
where
    F: FnOnce() -> i32,
{
    TrapOutcome::Completed(user_fn())
}

fn write_dump(short_name: &str, dump_dir: &std::path::Path) {
    let pid = std::process::id();
    let tid = thread_id_hint();
    let now = foundation_core::time::system_time_micros();
    let secs = now / 1_000_000;
    let (date, time) = epoch_seconds_to_date_time(secs);

    let path: PathBuf = dump_dir.join(format!("{short_name}-{date}-{time}-{pid}-{tid}.dmp"));
    let context = error::error_context_buffer();
    let mut body = String::new();
    for frame in &context {
        body.push_str(&format!("{}: {}\n", frame.name, frame.data));
    }
    let _ = fs::write(&path, body);

    error::error_report(
        ErrorKind::Exception,
        Severity::Panic,
        format!("fault trapped, dump written to {}", path.display()),
    );
}

/// A best-effort numeric thread identifier for the dump file name —
/// `std::thread::ThreadId` has no public numeric form, so this hashes its
/// `Debug` output instead, adequate for making two dumps from different
/// threads distinguishable on disk.
fn thread_id_hint() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", std::thread::current().id()).hash(&mut hasher);
    hasher.finish() & 0xFFFF
}

fn epoch_seconds_to_date_time(secs: u64) -> (String, String) {
    const SECS_PER_DAY: u64 = 86_400;
    let days = secs / SECS_PER_DAY;
    let day_secs = secs % SECS_PER_DAY;
    let (hour, minute, second) = (day_secs / 3600, (day_secs % 3600) / 60, day_secs % 60);

    // Civil-from-days algorithm (Howard Hinnant's public-domain chrono
    // formula), avoiding a chrono dependency for a dump-filename timestamp.
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if month <= 2 { y + 1 } else { y };

    (
        format!("{y:04}{month:02}{d:02}"),
        format!("{hour:02}{minute:02}{second:02}"),
    )
}

/// Tear down in reverse dependency order and collect the tracker's final
/// leak report.
pub fn finalize() -> Vec<foundation_alloc::LeakRecord> {
    foundation_alloc::finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_matches_external_interface_constants() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::InitFailure.as_i32(), -1);
        assert_eq!(ExitCode::CrashDumpGenerated.as_i32(), 0x0badf00du32 as i32);
    }

    #[test]
    fn run_returns_success_for_a_clean_user_fn() {
        let dir = std::env::temp_dir();
        let outcome = run("selftest", &dir, || 0);
        assert_eq!(outcome, ExitCode::Success);
    }

    #[test]
    fn run_returns_init_failure_for_a_nonzero_user_fn() {
        let dir = std::env::temp_dir();
        let outcome = run("selftest", &dir, || 7);
        assert_eq!(outcome, ExitCode::InitFailure);
    }

    #[test]
    fn epoch_seconds_formats_date_and_time_independently() {
        // 1970-01-01 00:00:00 UTC.
        assert_eq!(epoch_seconds_to_date_time(0), ("19700101".into(), "000000".into()));
        // 2009-02-13 23:31:30 UTC (unix time 1234567890), chosen because
        // date and time components are all distinct, so a regression that
        // mixes them up (e.g. printing the month where minutes belong)
        // cannot accidentally pass.
        assert_eq!(
            epoch_seconds_to_date_time(1_234_567_890),
            ("20090213".into(), "233130".into())
        );
    }
}
