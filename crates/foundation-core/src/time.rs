//! Time source — wall-clock and monotonic ticks.
//!
//! The original measures both "system time" (wall clock, for UUID v1 and log
//! timestamps) and a monotonic tick counter (for beacon/ring timeouts and
//! delayed-event due checks) through platform-specific calls
//! (`QueryPerformanceCounter`, `clock_gettime(CLOCK_MONOTONIC)`). `std::time`
//! already abstracts that split for us: [`Instant`] is the monotonic side,
//! [`SystemTime`] is the wall-clock side.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Ticks elapsed since an arbitrary but fixed process-wide epoch, at
/// [`ticks_per_second`] resolution. Used for delayed-event due times and
/// beacon/ring timeout deadlines — anything that must be monotonic and
/// immune to wall-clock adjustment.
#[must_use]
pub fn current_ticks() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// Resolution of [`current_ticks`]: one tick is one nanosecond.
#[must_use]
pub const fn ticks_per_second() -> u64 {
    1_000_000_000
}

/// Microseconds since the Unix epoch (UTC), used by UUID v1 generation and
/// log timestamps. Clamped to zero if the system clock reads before the
/// epoch.
#[must_use]
pub fn system_time_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// 100-nanosecond intervals since the Unix epoch, the unit UUID v1 timestamps
/// are expressed in before rebasing onto the UUID epoch (1582-10-15).
#[must_use]
pub fn system_time_100ns_intervals() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_nanos() / 100) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_monotonic() {
        let a = current_ticks();
        let b = current_ticks();
        assert!(b >= a);
    }

    #[test]
    fn system_time_micros_is_plausible() {
        // Any time after 2020-01-01 in microseconds.
        assert!(system_time_micros() > 1_577_836_800_000_000);
    }
}
