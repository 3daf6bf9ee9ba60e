//! The two-tier memory subsystem: a persistent heap path, an optional
//! process-wide "temporary" bump arena, a thread-local memory-context
//! stack, and a pluggable leak tracker.
//!
//! Everything here is reached through the free functions at the bottom of
//! this module, backed by a single process-wide [`Allocator`] behind a
//! [`OnceLock`]. `initialize` is optional — calling `allocate` before it
//! lazily stands up a default-configured allocator (no arena, no tracker),
//! matching a library that must be usable without an explicit setup call.

pub mod allocator;
pub mod arena;
pub mod config;
pub mod context;
pub mod tracker;

use std::sync::OnceLock;

pub use allocator::{Allocator, AllocHint};
pub use arena::TemporaryArena;
pub use config::{AllocatorConfig, ConfigBuilder, TrackerMode};
pub use context::{context_pop, context_push, memory_context, ContextGuard};
pub use tracker::{LeakRecord, LocalTracker, MemoryTracker, NullTracker};

static ALLOCATOR: OnceLock<Allocator> = OnceLock::new();

fn allocator() -> &'static Allocator {
    ALLOCATOR.get_or_init(|| build_allocator(AllocatorConfig::default()))
}

fn build_allocator(config: AllocatorConfig) -> Allocator {
    let arena = Some(TemporaryArena::new(config.temporary_memory));
    let tracker: Option<Box<dyn MemoryTracker>> = match config.memory_tracker {
        TrackerMode::None => None,
        TrackerMode::Local => Some(Box::new(LocalTracker::new())),
    };
    Allocator::new(arena, tracker)
}

/// Stand up the process-wide allocator with an explicit configuration.
/// Only the first call (across `initialize` and any lazy-initializing
/// `allocate`) has effect; later calls are no-ops, mirroring the
/// process-lifecycle contract that `initialize` runs once.
pub fn initialize(config: AllocatorConfig) {
    let _ = ALLOCATOR.get_or_init(|| build_allocator(config));
}

/// Allocate `size` bytes aligned to `align`, routed by `hint`.
pub fn allocate(size: usize, align: usize, hint: AllocHint) -> Option<*mut u8> {
    allocator().allocate(size, align, hint)
}

/// Zeroed variant of [`allocate`].
pub fn allocate_zero(size: usize, align: usize, hint: AllocHint) -> Option<*mut u8> {
    allocator().allocate_zero(size, align, hint)
}

/// Reallocate a previously heap-allocated pointer. Panics if `p` is arena
/// memory — see [`Allocator::reallocate`].
pub fn reallocate(p: *mut u8, size: usize, align: usize, old_size: usize) -> Option<*mut u8> {
    allocator().reallocate(p, size, align, old_size)
}

/// Release a pointer. No-op if it falls within the arena's range.
pub fn deallocate(p: *mut u8, size: usize, align: usize) {
    allocator().deallocate(p, size, align);
}

/// Tear down the process-wide allocator's tracker and return its final
/// leak report. Safe to call even if no tracker was installed (returns an
/// empty report).
pub fn finalize() -> Vec<LeakRecord> {
    allocator().finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_allocator_serves_heap_requests_without_explicit_initialize() {
        let p = allocate(32, 8, AllocHint::Default).expect("lazy allocator should serve a request");
        deallocate(p, 32, 8);
    }

    #[test]
    fn temporary_hint_is_served_by_the_default_arena() {
        let p = allocate(16, 8, AllocHint::Temporary).expect("default arena should serve small temporaries");
        deallocate(p, 16, 8);
    }
}
