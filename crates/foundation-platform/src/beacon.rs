//! Beacon: a multiplexed wait primitive combining one intrinsic signal
//! (slot 0) with up to [`MAX_EXTERNAL_SLOTS`] externally registered
//! OS-waitable file descriptors.
//!
//! Slot 0 is a portable condvar+flag pair so the intrinsic wake path works
//! identically on every target. External slots are polled with `nix::poll`
//! on unix (a zero-timeout poll, re-checked on the same cadence as the
//! intrinsic condvar wait) since `poll(2)`'s fd-set shape is a closer match
//! to "a handful of externally added waitables" than standing up a whole
//! epoll instance for what is usually zero or one extra fd. Non-unix
//! targets fall back to slot 0 only, matching the distilled spec's own
//! POSIX-fallback branch.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Maximum number of externally added waitable descriptors (slots 1..N),
/// on top of the intrinsic slot 0.
pub const MAX_EXTERNAL_SLOTS: usize = 8;

/// How often the wait loop re-checks external slots while also honoring
/// the intrinsic condvar, when both are in play.
const POLL_GRANULARITY: Duration = Duration::from_millis(5);

struct State {
    fired: bool,
}

/// A beacon: `fire()` wakes any thread blocked in `try_wait`. Fires that
/// arrive with nobody waiting are coalesced into a single pending flag,
/// consumed by the next `try_wait` — idempotent within one wait cycle.
pub struct Beacon {
    state: Mutex<State>,
    condvar: Condvar,
    #[cfg(unix)]
    externals: Mutex<Vec<std::os::fd::RawFd>>,
}

impl Beacon {
    #[must_use]
    pub fn new() -> Self {
        Beacon {
            state: Mutex::new(State { fired: false }),
            condvar: Condvar::new(),
            #[cfg(unix)]
            externals: Mutex::new(Vec::new()),
        }
    }

    /// Wake any thread currently (or subsequently, until consumed)
    /// blocked on slot 0.
    pub fn fire(&self) {
        let mut state = self.state.lock();
        state.fired = true;
        self.condvar.notify_all();
    }

    /// Register an external OS-waitable descriptor as slot `1..=N`.
    /// Returns its slot index, or `None` if [`MAX_EXTERNAL_SLOTS`] is
    /// already full.
    #[cfg(unix)]
    pub fn add_waitable(&self, fd: std::os::fd::RawFd) -> Option<usize> {
        let mut externals = self.externals.lock();
        if externals.len() >= MAX_EXTERNAL_SLOTS {
            return None;
        }
        externals.push(fd);
        Some(externals.len())
    }

    /// Remove a previously registered external descriptor. No-op if it
    /// was never registered (or already removed).
    #[cfg(unix)]
    pub fn remove_waitable(&self, fd: std::os::fd::RawFd) {
        self.externals.lock().retain(|&f| f != fd);
    }

    /// Block until fired, an external slot becomes readable, or `timeout`
    /// elapses. `Some(0)` means the intrinsic beacon fired; `Some(n)` for
    /// `n >= 1` means external slot `n`'s descriptor is ready; `None`
    /// means timeout. Slot 0 is edge-cleared here before returning.
    pub fn try_wait(&self, timeout: Option<Duration>) -> Option<usize> {
        let deadline = timeout.map(|d| Instant::now() + d);

        loop {
            {
                let mut state = self.state.lock();
                if state.fired {
                    state.fired = false;
                    return Some(0);
                }
            }

            #[cfg(unix)]
            if let Some(slot) = self.poll_externals_once() {
                return Some(slot);
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    (deadline - now).min(POLL_GRANULARITY)
                }
                None => POLL_GRANULARITY,
            };

            let mut state = self.state.lock();
            if state.fired {
                state.fired = false;
                return Some(0);
            }
            let _ = self.condvar.wait_for(&mut state, remaining);
            if state.fired {
                state.fired = false;
                return Some(0);
            }
        }
    }

    #[cfg(unix)]
    fn poll_externals_once(&self) -> Option<usize> {
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
        use std::os::fd::BorrowedFd;

        let externals = self.externals.lock();
        if externals.is_empty() {
            return None;
        }

        let mut fds: Vec<PollFd> = externals
            .iter()
            .map(|&fd| {
                // SAFETY: the caller guarantees a registered fd stays open
                // for at least the duration of the wait that observes it.
                let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
                PollFd::new(borrowed, PollFlags::POLLIN)
            })
            .collect();

        match poll(&mut fds, PollTimeout::from(0u8)) {
            Ok(n) if n > 0 => fds
                .iter()
                .position(|pfd| pfd.revents().unwrap_or_else(PollFlags::empty).contains(PollFlags::POLLIN))
                .map(|idx| idx + 1),
            _ => None,
        }
    }
}

impl Default for Beacon {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fire_wakes_a_blocked_waiter_within_a_second() {
        let beacon = Arc::new(Beacon::new());
        let waiter = {
            let beacon = Arc::clone(&beacon);
            thread::spawn(move || beacon.try_wait(Some(Duration::from_secs(1))))
        };
        thread::sleep(Duration::from_millis(20));
        beacon.fire();
        assert_eq!(waiter.join().unwrap(), Some(0));
    }

    #[test]
    fn wait_without_a_fire_times_out() {
        let beacon = Beacon::new();
        assert_eq!(beacon.try_wait(Some(Duration::from_millis(10))), None);
    }

    #[test]
    fn a_fire_before_wait_is_not_lost() {
        let beacon = Beacon::new();
        beacon.fire();
        assert_eq!(beacon.try_wait(Some(Duration::from_millis(10))), Some(0));
    }

    #[test]
    fn extra_fires_within_one_cycle_coalesce() {
        let beacon = Beacon::new();
        beacon.fire();
        beacon.fire();
        beacon.fire();
        assert_eq!(beacon.try_wait(Some(Duration::from_millis(10))), Some(0));
        assert_eq!(beacon.try_wait(Some(Duration::from_millis(10))), None);
    }
}
