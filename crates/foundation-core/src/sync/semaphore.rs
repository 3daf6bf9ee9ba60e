//! Counting semaphores — unnamed (owned) and named (process-shared by
//! string identity, the same-process analogue of the original's `sem_t`
//! name registry).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A counting semaphore. Value is clamped to `0..=0xFFFF`, matching the
/// original's 16-bit counting range.
pub struct Semaphore {
    state: Mutex<u32>,
    condvar: Condvar,
}

const MAX_VALUE: u32 = 0xFFFF;

impl Semaphore {
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Semaphore {
            state: Mutex::new(initial.min(MAX_VALUE)),
            condvar: Condvar::new(),
        }
    }

    /// Block until the count is positive, then decrement it.
    pub fn wait(&self) {
        let mut count = self.state.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Block up to `timeout` (or forever if `None`) for the count to become
    /// positive; returns `true` if acquired, `false` on timeout.
    pub fn try_wait(&self, timeout: Option<Duration>) -> bool {
        let mut count = self.state.lock();
        let deadline = timeout.map(|d| Instant::now() + d);
        while *count == 0 {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    if self.condvar.wait_for(&mut count, deadline - now).timed_out() && *count == 0 {
                        return false;
                    }
                }
                None => self.condvar.wait(&mut count),
            }
        }
        *count -= 1;
        true
    }

    /// Increment the count by one and wake one waiter.
    pub fn post(&self) {
        self.post_multiple(1);
    }

    /// Increment the count by `n` (saturating at the max value) and wake up
    /// to `n` waiters.
    pub fn post_multiple(&self, n: u32) {
        let mut count = self.state.lock();
        *count = count.saturating_add(n).min(MAX_VALUE);
        drop(count);
        for _ in 0..n {
            self.condvar.notify_one();
        }
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        *self.state.lock()
    }
}

type NamedRegistry = Mutex<HashMap<String, Arc<Semaphore>>>;

static NAMED_SEMAPHORES: OnceLock<NamedRegistry> = OnceLock::new();

fn registry() -> &'static NamedRegistry {
    NAMED_SEMAPHORES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Open (or create) a process-wide named semaphore. Two handles opened with
/// the same `name` in the same process share state.
pub fn open_named(name: &str, initial: u32) -> Arc<Semaphore> {
    let mut reg = registry().lock();
    Arc::clone(
        reg.entry(name.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(initial))),
    )
}

/// Remove a named semaphore from the registry. Existing `Arc` handles
/// remain valid until dropped; only future `open_named` calls see a fresh
/// semaphore.
pub fn unlink_named(name: &str) {
    registry().lock().remove(name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn post_then_wait_does_not_block() {
        let s = Semaphore::new(0);
        s.post();
        s.wait();
    }

    #[test]
    fn try_wait_times_out_on_zero() {
        let s = Semaphore::new(0);
        assert!(!s.try_wait(Some(Duration::from_millis(20))));
    }

    #[test]
    fn post_multiple_wakes_multiple_waiters() {
        let s = Arc::new(Semaphore::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = Arc::clone(&s);
            handles.push(thread::spawn(move || s.wait()));
        }
        thread::sleep(Duration::from_millis(20));
        s.post_multiple(4);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.value(), 0);
    }

    #[test]
    fn named_semaphores_share_state_within_process() {
        let name = "foundation-core-test-sem";
        unlink_named(name);
        let a = open_named(name, 0);
        let b = open_named(name, 5);
        a.post();
        assert_eq!(b.value(), 1, "b should observe a's post via shared state");
        unlink_named(name);
    }
}
