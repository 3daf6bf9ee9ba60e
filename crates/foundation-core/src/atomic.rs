//! Atomic cells and memory fences.
//!
//! Thin, explicitly-ordered wrappers over `core::sync::atomic`. 64-bit
//! operations on 32-bit targets are already lowered to a double-CAS loop by
//! `AtomicU64` on platforms that need it, so there is no manual fallback
//! here — we simply delegate.

use std::sync::atomic::{fence, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Explicit ordering for cell operations. `Nonatomic` maps to `Relaxed`:
/// Rust has no true non-atomic escape hatch for a shared cell, so the
/// "unordered" view the original exposes for debugging publishes no
/// cross-location order here either — same caveat, weaker name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOrdering {
    Nonatomic,
    Relaxed,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

impl From<CellOrdering> for Ordering {
    fn from(o: CellOrdering) -> Ordering {
        match o {
            CellOrdering::Nonatomic | CellOrdering::Relaxed => Ordering::Relaxed,
            CellOrdering::Acquire => Ordering::Acquire,
            CellOrdering::Release => Ordering::Release,
            CellOrdering::AcqRel => Ordering::AcqRel,
            CellOrdering::SeqCst => Ordering::SeqCst,
        }
    }
}

/// A 32-bit atomic cell.
#[derive(Debug, Default)]
pub struct Cell32(AtomicU32);

/// A 64-bit atomic cell.
#[derive(Debug, Default)]
pub struct Cell64(AtomicU64);

/// A pointer-width atomic cell.
#[derive(Debug, Default)]
pub struct CellPtr(AtomicUsize);

macro_rules! impl_cell {
    ($name:ident, $inner:ty, $prim:ty) => {
        impl $name {
            pub fn new(value: $prim) -> Self {
                $name(<$inner>::new(value))
            }

            #[must_use]
            pub fn load(&self, order: CellOrdering) -> $prim {
                self.0.load(order.into())
            }

            pub fn store(&self, value: $prim, order: CellOrdering) {
                self.0.store(value, order.into());
            }

            /// Returns the value prior to the addition.
            pub fn fetch_add(&self, delta: $prim, order: CellOrdering) -> $prim {
                self.0.fetch_add(delta, order.into())
            }

            /// Returns the value after the addition.
            pub fn add(&self, delta: $prim, order: CellOrdering) -> $prim {
                self.0.fetch_add(delta, order.into()).wrapping_add(delta)
            }

            /// Compare-and-swap. Returns `true` on success.
            #[must_use]
            pub fn compare_and_swap(
                &self,
                current: $prim,
                new: $prim,
                success: CellOrdering,
                failure: CellOrdering,
            ) -> bool {
                self.0
                    .compare_exchange(current, new, success.into(), failure.into())
                    .is_ok()
            }
        }
    };
}

impl_cell!(Cell32, AtomicU32, u32);
impl_cell!(Cell64, AtomicU64, u64);
impl_cell!(CellPtr, AtomicUsize, usize);

/// Compiler-only fence: orders this thread's accesses but issues no
/// inter-core barrier.
pub fn fence_signal(order: CellOrdering) {
    std::sync::atomic::compiler_fence(order.into());
}

/// Inter-core fence, visible to other threads.
pub fn fence_thread(order: CellOrdering) {
    fence(order.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn cas_linearizability_32_threads() {
        let cell = Arc::new(Cell32::new(0));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let cell = Arc::clone(&cell);
            handles.push(thread::spawn(move || {
                for _ in 0..65_535 {
                    loop {
                        let current = cell.load(CellOrdering::SeqCst);
                        if cell.compare_and_swap(
                            current,
                            current.wrapping_add(1),
                            CellOrdering::SeqCst,
                            CellOrdering::SeqCst,
                        ) {
                            break;
                        }
                    }
                    loop {
                        let current = cell.load(CellOrdering::SeqCst);
                        if cell.compare_and_swap(
                            current,
                            current.wrapping_sub(1),
                            CellOrdering::SeqCst,
                            CellOrdering::SeqCst,
                        ) {
                            break;
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cell.load(CellOrdering::SeqCst), 0);
    }

    #[test]
    fn fetch_add_returns_prior_add_returns_new() {
        let cell = Cell64::new(10);
        let prior = cell.fetch_add(5, CellOrdering::SeqCst);
        assert_eq!(prior, 10);
        assert_eq!(cell.load(CellOrdering::SeqCst), 15);

        let cell = Cell64::new(10);
        let after = cell.add(5, CellOrdering::SeqCst);
        assert_eq!(after, 15);
    }

    #[test]
    fn cas_fails_on_mismatch() {
        let cell = Cell32::new(7);
        assert!(!cell.compare_and_swap(6, 9, CellOrdering::SeqCst, CellOrdering::SeqCst));
        assert_eq!(cell.load(CellOrdering::SeqCst), 7);
    }
}
