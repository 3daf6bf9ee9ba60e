//! Heap allocation path and the hint-driven dispatch between it and the
//! temporary arena.
//!
//! Every heap block is prefixed by an [`AllocHeader`] word holding the raw
//! pointer returned by the global allocator and a tag bit distinguishing
//! the plain heap path from the `VIRTUAL`-hinted path. `deallocate` reads
//! that header to find the block's true start and free alignment rather
//! than trusting the caller-visible pointer directly — the same
//! `(raw_pointer, aligned_pointer)` split the arena and heap paths share.

use std::alloc::{self, Layout};
use std::mem;

use foundation_core::error::{error_report, ErrorKind, Severity};

use crate::arena::TemporaryArena;
use crate::tracker::MemoryTracker;

/// Hints steering `allocate` between the arena and heap paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocHint {
    /// Ordinary heap allocation.
    Default,
    /// Prefer the process-wide bump arena when it fits.
    Temporary,
    /// Too large or too sensitive to share an arena with normal traffic;
    /// tagged so `deallocate` can route it through the virtual-path release
    /// logic even though both paths currently share one `dealloc` call.
    Virtual,
}

/// Largest alignment the heap path will honor; larger requests are clamped.
pub const MAX_ALIGN: usize = 4096;

const POINTER_SIZE: usize = mem::size_of::<usize>();

/// Normalize a caller-requested alignment per the allocator's rules: zero
/// or anything below pointer size becomes pointer size, anything above
/// `MAX_ALIGN` is clamped down, everything else rounds up to a power of two.
#[must_use]
pub fn normalize_align(align: usize) -> usize {
    if align == 0 {
        return POINTER_SIZE;
    }
    align.max(POINTER_SIZE).min(MAX_ALIGN).next_power_of_two()
}

/// Header prepended to every heap block. `raw` is the pointer returned by
/// the global allocator; `tag` low bit discriminates the virtual path.
#[repr(C)]
struct AllocHeader {
    raw: *mut u8,
    tag: usize,
}

const VIRTUAL_TAG_BIT: usize = 1;

fn header_layout(align: usize) -> Layout {
    // The header itself must not be under-aligned relative to the block it
    // precedes, so the header's own layout is aligned to `align` too.
    Layout::from_size_align(mem::size_of::<AllocHeader>(), align.max(mem::align_of::<AllocHeader>()))
        .expect("header layout is always valid")
}

fn heap_allocate(size: usize, align: usize, zero: bool, virtual_path: bool) -> Option<*mut u8> {
    let header_layout = header_layout(align);
    let header_size = header_layout.size();
    let total = header_size.checked_add(size)?;
    let layout = Layout::from_size_align(total, align).ok()?;

    // SAFETY: `layout` has non-zero size since `header_size >= 1`.
    let raw = unsafe {
        if zero {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        }
    };
    if raw.is_null() {
        error_report(ErrorKind::OutOfMemory, Severity::Panic, format!("allocate: out of memory for {size} bytes"));
        return None;
    }

    // SAFETY: `raw` is valid for `total` bytes; `header_size` leaves room
    // for `size` more bytes after it, and `raw` is aligned to at least
    // `align_of::<AllocHeader>()`.
    let aligned = unsafe { raw.add(header_size) };
    let header_ptr = aligned.cast::<AllocHeader>().wrapping_sub(1);
    // SAFETY: `header_ptr` lies within `[raw, raw+header_size)`, which is
    // part of the allocation and correctly aligned for `AllocHeader`.
    unsafe {
        header_ptr.write(AllocHeader {
            raw,
            tag: if virtual_path { VIRTUAL_TAG_BIT } else { 0 },
        });
    }
    Some(aligned)
}

/// # Safety
/// `ptr` must have been returned by [`heap_allocate`] (or
/// [`heap_reallocate`]) with the header word still intact immediately
/// before it.
unsafe fn header_of(ptr: *mut u8) -> *mut AllocHeader {
    ptr.cast::<AllocHeader>().wrapping_sub(1)
}

/// Release a heap block previously returned by [`heap_allocate`].
///
/// # Safety
/// `ptr` must be a live pointer from this module's allocate/reallocate
/// path, and `size`/`align` must match the values last used to size it.
pub unsafe fn heap_deallocate(ptr: *mut u8, size: usize, align: usize) {
    let header_ptr = header_of(ptr);
    let header = header_ptr.read();
    let header_layout = header_layout(align);
    let total = header_layout.size() + size;
    let layout = Layout::from_size_align(total, align).expect("layout was valid at allocation time");
    alloc::dealloc(header.raw, layout);
}

/// Attempt in-place-or-copy reallocation of a heap block.
///
/// # Safety
/// Same preconditions as [`heap_deallocate`], plus `old_size` must match
/// the size the block was last allocated/reallocated with.
pub unsafe fn heap_reallocate(ptr: *mut u8, old_size: usize, new_size: usize, align: usize) -> Option<*mut u8> {
    let header_ptr = header_of(ptr);
    let header = header_ptr.read();
    let header_layout = header_layout(align);
    let old_total = header_layout.size() + old_size;
    let old_layout = Layout::from_size_align(old_total, align).ok()?;
    let new_total = header_layout.size().checked_add(new_size)?;

    let new_raw = alloc::realloc(header.raw, old_layout, new_total);
    if new_raw.is_null() {
        error_report(
            ErrorKind::OutOfMemory,
            Severity::Panic,
            format!("reallocate: out of memory growing to {new_size} bytes"),
        );
        return None;
    }

    let new_aligned = new_raw.add(header_layout.size());
    let new_header_ptr = new_aligned.cast::<AllocHeader>().wrapping_sub(1);
    new_header_ptr.write(AllocHeader {
        raw: new_raw,
        tag: header.tag,
    });
    Some(new_aligned)
}

/// `true` if the header tag at `ptr` marks it as having taken the
/// `VIRTUAL`-hinted path.
///
/// # Safety
/// `ptr` must be a live pointer from this module's allocate path.
pub unsafe fn is_virtual_path(ptr: *mut u8) -> bool {
    (*header_of(ptr)).tag & VIRTUAL_TAG_BIT != 0
}

/// Top-level allocator combining the arena and heap paths, plus leak
/// tracking and memory-context tagging.
pub struct Allocator {
    arena: Option<TemporaryArena>,
    tracker: Option<Box<dyn MemoryTracker>>,
}

impl Allocator {
    #[must_use]
    pub fn new(arena: Option<TemporaryArena>, tracker: Option<Box<dyn MemoryTracker>>) -> Self {
        if let Some(t) = tracker.as_deref() {
            t.init();
        }
        Allocator { arena, tracker }
    }

    #[must_use]
    pub fn arena(&self) -> Option<&TemporaryArena> {
        self.arena.as_ref()
    }

    fn track(&self, ptr: *mut u8, size: usize) {
        if let Some(tracker) = &self.tracker {
            tracker.track(ptr as u64, size as u64, crate::context::memory_context());
        }
    }

    fn untrack(&self, ptr: *mut u8) {
        if let Some(tracker) = &self.tracker {
            tracker.untrack(ptr as u64);
        }
    }

    /// Allocate `size` bytes aligned to `align`, routed by `hint`.
    pub fn allocate(&self, size: usize, align: usize, hint: AllocHint) -> Option<*mut u8> {
        let align = normalize_align(align);
        if hint == AllocHint::Temporary {
            if let Some(arena) = &self.arena {
                if let Some(p) = arena.try_allocate(size, align) {
                    return Some(p);
                }
            }
        }
        let p = heap_allocate(size, align, false, hint == AllocHint::Virtual)?;
        self.track(p, size);
        Some(p)
    }

    /// Zeroed variant of [`Allocator::allocate`].
    pub fn allocate_zero(&self, size: usize, align: usize, hint: AllocHint) -> Option<*mut u8> {
        let align = normalize_align(align);
        if hint == AllocHint::Temporary {
            if let Some(arena) = &self.arena {
                if let Some(p) = arena.try_allocate_zeroed(size, align) {
                    return Some(p);
                }
            }
        }
        let p = heap_allocate(size, align, true, hint == AllocHint::Virtual)?;
        self.track(p, size);
        Some(p)
    }

    /// Reallocate a heap pointer. Asserts (panics) if `p` falls within the
    /// arena's range — arena memory is never individually reallocated.
    pub fn reallocate(&self, p: *mut u8, size: usize, align: usize, old_size: usize) -> Option<*mut u8> {
        if let Some(arena) = &self.arena {
            assert!(
                !arena.contains(p),
                "reallocate called on a pointer owned by the temporary arena"
            );
        }
        let align = normalize_align(align);
        self.untrack(p);
        // SAFETY: `p` was allocated by this allocator's heap path (the
        // arena-containment assertion above rules out the other path).
        let new_p = unsafe { heap_reallocate(p, old_size, size, align) }?;
        self.track(new_p, size);
        Some(new_p)
    }

    /// Release a pointer. No-op if it falls within the arena's range
    /// (arena memory is reclaimed only by wraparound, never individually).
    pub fn deallocate(&self, p: *mut u8, size: usize, align: usize) {
        if let Some(arena) = &self.arena {
            if arena.contains(p) {
                return;
            }
        }
        self.untrack(p);
        let align = normalize_align(align);
        // SAFETY: `p` was allocated by this allocator's heap path and is
        // not arena memory, per the check above.
        unsafe { heap_deallocate(p, size, align) };
    }

    /// Tear down: invoke the tracker's `fini` and return its final leak
    /// report, if a tracker is installed.
    pub fn finalize(&self) -> Vec<crate::tracker::LeakRecord> {
        match &self.tracker {
            Some(tracker) => {
                let report = tracker.leak_report();
                if !report.is_empty() {
                    error_report(
                        ErrorKind::MemoryLeak,
                        Severity::Warning,
                        format!("{} allocation(s) leaked", report.len()),
                    );
                }
                tracker.fini();
                report
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::LocalTracker;

    #[test]
    fn normalize_align_rules() {
        assert_eq!(normalize_align(0), POINTER_SIZE);
        assert_eq!(normalize_align(1), POINTER_SIZE);
        assert_eq!(normalize_align(3), POINTER_SIZE.max(4).next_power_of_two());
        assert_eq!(normalize_align(MAX_ALIGN * 4), MAX_ALIGN);
    }

    #[test]
    fn heap_round_trip_allocate_and_deallocate() {
        let allocator = Allocator::new(None, None);
        let p = allocator.allocate(128, 16, AllocHint::Default).unwrap();
        assert_eq!((p as usize) % 16, 0);
        // SAFETY: p is valid for 128 bytes, just allocated.
        unsafe {
            std::ptr::write_bytes(p, 0xAB, 128);
            assert_eq!(*p, 0xAB);
        }
        allocator.deallocate(p, 128, 16);
    }

    #[test]
    fn zeroed_heap_allocation_is_zero() {
        let allocator = Allocator::new(None, None);
        let p = allocator.allocate_zero(64, 8, AllocHint::Default).unwrap();
        // SAFETY: p is valid for 64 bytes.
        let slice = unsafe { std::slice::from_raw_parts(p, 64) };
        assert!(slice.iter().all(|&b| b == 0));
        allocator.deallocate(p, 64, 8);
    }

    #[test]
    fn temporary_hint_serves_from_arena_when_present() {
        let allocator = Allocator::new(Some(TemporaryArena::new(4096)), None);
        let p = allocator.allocate(32, 8, AllocHint::Temporary).unwrap();
        assert!(allocator.arena().unwrap().contains(p));
        // Deallocate on arena memory is a documented no-op.
        allocator.deallocate(p, 32, 8);
    }

    #[test]
    fn oversized_temporary_request_falls_back_to_heap() {
        let allocator = Allocator::new(Some(TemporaryArena::new(1024)), None);
        // max_chunk for a 1024-byte arena is 128; ask for more.
        let p = allocator.allocate(512, 8, AllocHint::Temporary).unwrap();
        assert!(!allocator.arena().unwrap().contains(p));
        allocator.deallocate(p, 512, 8);
    }

    #[test]
    #[should_panic(expected = "owned by the temporary arena")]
    fn reallocate_on_arena_pointer_panics() {
        let allocator = Allocator::new(Some(TemporaryArena::new(4096)), None);
        let p = allocator.allocate(32, 8, AllocHint::Temporary).unwrap();
        allocator.reallocate(p, 64, 8, 32);
    }

    #[test]
    fn reallocate_preserves_leading_bytes() {
        let allocator = Allocator::new(None, None);
        let p = allocator.allocate(16, 8, AllocHint::Default).unwrap();
        // SAFETY: p valid for 16 bytes.
        unsafe { std::ptr::write_bytes(p, 0x42, 16) };
        let grown = allocator.reallocate(p, 64, 8, 16).unwrap();
        // SAFETY: grown valid for 64 bytes, first 16 must be preserved.
        let slice = unsafe { std::slice::from_raw_parts(grown, 16) };
        assert!(slice.iter().all(|&b| b == 0x42));
        allocator.deallocate(grown, 64, 8);
    }

    #[test]
    fn virtual_hint_tags_header_for_later_dispatch() {
        let allocator = Allocator::new(None, None);
        let p = allocator.allocate(32, 8, AllocHint::Virtual).unwrap();
        // SAFETY: p came from this allocator's heap path.
        assert!(unsafe { is_virtual_path(p) });
        allocator.deallocate(p, 32, 8);
    }

    #[test]
    fn leak_report_carries_the_active_memory_context_tag() {
        let allocator = Allocator::new(None, Some(Box::new(LocalTracker::new())));
        let _guard = crate::context::ContextGuard::push(99);
        let p = allocator.allocate(16, 8, AllocHint::Default).unwrap();
        let leaks = allocator.finalize();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].context_tag, 99);
        allocator.deallocate(p, 16, 8);
    }

    #[test]
    fn finalize_reports_leaks_from_installed_tracker() {
        let allocator = Allocator::new(None, Some(Box::new(LocalTracker::new())));
        let p1 = allocator.allocate(16, 8, AllocHint::Default).unwrap();
        let p2 = allocator.allocate(16, 8, AllocHint::Default).unwrap();
        allocator.deallocate(p1, 16, 8);
        let leaks = allocator.finalize();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].address, p2 as u64);
        allocator.deallocate(p2, 16, 8);
    }
}
