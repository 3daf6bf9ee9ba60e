//! Thread: create / start / join / TLS, named by a packed `(tag, index)`
//! [`ObjectMap`] handle so a stale handle is detectable after the thread
//! object is freed — the same pattern the library loader (component Q)
//! uses to name open libraries.
//!
//! Built on `std::thread::Builder` rather than a raw `clone()` syscall:
//! the portability and the TLS teardown hook `std::thread` already gives
//! us make reimplementing thread creation pointless busywork for a
//! library whose own contract ("preemptive OS threads with shared address
//! space, no coroutine runtime") is exactly what `std::thread` models.
//! Cancellation is cooperative, per the concurrency model: `terminate()`
//! sets a flag, the thread body must poll [`should_terminate`].

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use foundation_core::objectmap::{Handle, ObjectMap};

thread_local! {
    static OWN_STOP_FLAG: RefCell<Option<Arc<AtomicBool>>> = const { RefCell::new(None) };
}

/// Poll from inside a thread body started via [`Thread::spawn`] to check
/// whether [`Thread::terminate`] has been called for this thread. Reads
/// `false` outside a thread started through [`Thread::spawn`].
#[must_use]
pub fn should_terminate() -> bool {
    OWN_STOP_FLAG.with(|flag| {
        flag.borrow()
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Acquire))
    })
}

struct ThreadEntry {
    should_stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinHandleError {
    #[error("thread handle is stale or unknown")]
    StaleHandle,
    #[error("thread was already joined")]
    AlreadyJoined,
    #[error("spawned thread panicked")]
    Panicked,
}

/// Process-wide thread registry, sized by the `thread_map_size`
/// configuration key.
pub struct Thread {
    map: ObjectMap<Arc<parking_lot::Mutex<ThreadEntry>>>,
}

/// An opaque handle naming a thread started through [`Thread::spawn`].
pub type ThreadHandle = Handle;

impl Thread {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Thread {
            map: ObjectMap::new(capacity),
        }
    }

    /// Start a named thread running `body`. `body` receives no arguments;
    /// it polls [`should_terminate`] to cooperate with [`Self::terminate`].
    /// Returns `None` if the thread map is full.
    pub fn spawn<F>(&self, name: impl Into<String>, body: F) -> Option<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.map.reserve()?;
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop_for_body = Arc::clone(&should_stop);

        let join = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                OWN_STOP_FLAG.with(|flag| *flag.borrow_mut() = Some(stop_for_body));
                body();
            })
            .ok()?;

        self.map.set(
            handle,
            Arc::new(parking_lot::Mutex::new(ThreadEntry {
                should_stop,
                join: Some(join),
            })),
        );
        Some(handle)
    }

    /// Request that the thread named by `handle` stop cooperatively. The
    /// flag is visible to [`should_terminate`] immediately, but nothing
    /// forces the thread body to poll it.
    pub fn terminate(&self, handle: ThreadHandle) -> Result<(), JoinHandleError> {
        let entry = self.map.lookup(handle).ok_or(JoinHandleError::StaleHandle)?;
        entry.lock().should_stop.store(true, Ordering::Release);
        Ok(())
    }

    /// Block until the named thread finishes, then free its handle.
    pub fn join(&self, handle: ThreadHandle) -> Result<(), JoinHandleError> {
        let entry = self.map.lookup(handle).ok_or(JoinHandleError::StaleHandle)?;
        let join_handle = entry
            .lock()
            .join
            .take()
            .ok_or(JoinHandleError::AlreadyJoined)?;
        self.map.free(handle);
        join_handle.join().map_err(|_| JoinHandleError::Panicked)
    }
}

/// Per-thread scratch state set up lazily on first use and torn down on
/// thread exit via a single `thread_local!` destructor: a display name
/// and a deterministic-enough RNG seed, matching the concurrency model's
/// "each thread owns a persistent block of thread-local state."
pub struct ThreadLocalState {
    pub name: String,
    seed: Cell<u64>,
}

impl ThreadLocalState {
    fn new() -> Self {
        ThreadLocalState {
            name: std::thread::current().name().unwrap_or("unnamed").to_string(),
            seed: Cell::new(foundation_core::time::system_time_micros() ^ 0x9E37_79B9_7F4A_7C15),
        }
    }

    /// A xorshift64* step, reseeded from wall-clock microseconds at
    /// thread-local construction — adequate for non-cryptographic jitter
    /// (e.g. UUID clock sequences), not for security-sensitive randomness.
    pub fn next_random(&self) -> u64 {
        let mut x = self.seed.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.seed.set(x);
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

thread_local! {
    static LOCAL_STATE: ThreadLocalState = ThreadLocalState::new();
}

/// Access this thread's lazily-initialized [`ThreadLocalState`].
pub fn with_local_state<R>(f: impl FnOnce(&ThreadLocalState) -> R) -> R {
    LOCAL_STATE.with(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn spawn_join_round_trips() {
        let threads = Thread::new(4);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_body = Arc::clone(&ran);
        let handle = threads
            .spawn("worker", move || {
                ran_in_body.fetch_add(1, Ordering::SeqCst);
            })
            .expect("map has room");
        threads.join(handle).expect("join should succeed");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn joining_twice_reports_already_joined() {
        let threads = Thread::new(4);
        let handle = threads.spawn("worker", || {}).unwrap();
        threads.join(handle).unwrap();
        assert_eq!(threads.join(handle), Err(JoinHandleError::StaleHandle));
    }

    #[test]
    fn should_terminate_observes_a_terminate_call_mid_run() {
        let threads = Thread::new(4);
        let iterations = Arc::new(AtomicUsize::new(0));
        let iterations_in_body = Arc::clone(&iterations);
        let handle = threads
            .spawn("worker", move || {
                while !should_terminate() {
                    iterations_in_body.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                }
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        threads.terminate(handle).expect("thread is still live");
        threads.join(handle).unwrap();
        assert!(iterations.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn exhausted_map_refuses_new_threads() {
        let threads = Thread::new(1);
        let _h = threads.spawn("only", || {}).unwrap();
        assert!(threads.spawn("overflow", || {}).is_none());
    }

    #[test]
    fn local_state_rng_produces_varying_values() {
        with_local_state(|state| {
            let a = state.next_random();
            let b = state.next_random();
            assert_ne!(a, b);
        });
    }
}
