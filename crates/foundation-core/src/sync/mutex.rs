//! Recursive mutex doubling as a condition variable.
//!
//! `lock`/`try_lock`/`unlock` behave like a standard recursive mutex
//! (reentrant on the owning thread); `wait`/`signal` treat the same lock as
//! a condvar: `wait` atomically releases the mutex, sleeps, and reacquires
//! it at its prior recursion depth on wakeup. A `signal` that arrives
//! before any thread calls `wait` is not lost — it sets a pending flag the
//! next `wait` consumes immediately.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex as RawMutex};

struct State {
    owner: Option<ThreadId>,
    depth: u32,
    signaled: bool,
}

/// A recursive mutex with condvar-style `wait`/`signal`.
pub struct Mutex {
    state: RawMutex<State>,
    condvar: Condvar,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    #[must_use]
    pub fn new() -> Self {
        Mutex {
            state: RawMutex::new(State {
                owner: None,
                depth: 0,
                signaled: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Acquire the lock, blocking if held by another thread. Reentrant.
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut guard = self.state.lock();
        loop {
            match guard.owner {
                None => {
                    guard.owner = Some(me);
                    guard.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    guard.depth += 1;
                    return;
                }
                Some(_) => {
                    self.condvar.wait(&mut guard);
                }
            }
        }
    }

    /// Attempt to acquire the lock without blocking.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        let me = thread::current().id();
        let mut guard = self.state.lock();
        match guard.owner {
            None => {
                guard.owner = Some(me);
                guard.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                guard.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Release one level of recursion. Fully unlocked (and another waiter
    /// woken) once `depth` reaches zero.
    ///
    /// # Panics
    /// Panics if the calling thread does not hold the lock.
    pub fn unlock(&self) {
        let me = thread::current().id();
        let mut guard = self.state.lock();
        assert_eq!(guard.owner, Some(me), "unlock called by non-owning thread");
        guard.depth -= 1;
        if guard.depth == 0 {
            guard.owner = None;
            self.condvar.notify_one();
        }
    }

    /// Atomically release the lock (saving recursion depth), sleep until
    /// `signal` or `timeout`, then reacquire the lock at the same depth.
    /// Returns `true` if woken by a signal, `false` on timeout.
    ///
    /// # Panics
    /// Panics if the calling thread does not hold the lock.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let me = thread::current().id();
        let mut guard = self.state.lock();
        assert_eq!(guard.owner, Some(me), "wait called by non-owning thread");
        let saved_depth = guard.depth;
        guard.owner = None;
        guard.depth = 0;
        self.condvar.notify_one();

        let deadline = timeout.map(|d| Instant::now() + d);
        let woke_on_signal = loop {
            if guard.signaled {
                guard.signaled = false;
                break true;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break false;
                    }
                    let timed_out = self.condvar.wait_for(&mut guard, deadline - now);
                    if guard.signaled {
                        guard.signaled = false;
                        break true;
                    }
                    if timed_out.timed_out() {
                        break false;
                    }
                }
                None => {
                    self.condvar.wait(&mut guard);
                }
            }
        };

        // Reacquire ownership at the saved depth.
        loop {
            match guard.owner {
                None => {
                    guard.owner = Some(me);
                    guard.depth = saved_depth;
                    break;
                }
                Some(owner) if owner == me => unreachable!("reentrant reacquire during wait"),
                Some(_) => self.condvar.wait(&mut guard),
            }
        }

        woke_on_signal
    }

    /// Set the pending-signal flag and wake one waiter (or the next thread
    /// to call `wait`, if none is waiting yet).
    pub fn signal(&self) {
        let mut guard = self.state.lock();
        guard.signaled = true;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reentrant_lock_same_thread() {
        let m = Mutex::new();
        m.lock();
        assert!(m.try_lock());
        m.unlock();
        m.unlock();
    }

    #[test]
    fn try_lock_fails_when_held_by_other_thread() {
        let m = Arc::new(Mutex::new());
        m.lock();
        let m2 = Arc::clone(&m);
        let held = thread::spawn(move || m2.try_lock()).join().unwrap();
        assert!(!held);
        m.unlock();
    }

    #[test]
    fn wait_releases_and_reacquires() {
        let m = Arc::new(Mutex::new());
        let m2 = Arc::clone(&m);
        m.lock();
        let handle = thread::spawn(move || {
            m2.lock();
            m2.signal();
            m2.unlock();
        });
        let woke = m.wait(Some(Duration::from_secs(2)));
        assert!(woke);
        m.unlock();
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_signal() {
        let m = Mutex::new();
        m.lock();
        let woke = m.wait(Some(Duration::from_millis(20)));
        assert!(!woke);
        m.unlock();
    }

    #[test]
    fn signal_before_wait_is_not_lost() {
        let m = Mutex::new();
        m.lock();
        m.signal();
        let woke = m.wait(Some(Duration::from_millis(50)));
        assert!(woke, "pending signal must be consumed by the next wait");
        m.unlock();
    }
}
