//! Object map: a fixed-capacity slot array with an atomic free-list and a
//! strictly-increasing per-slot tag counter, used to hand out packed
//! `(tag, index)` handles for long-lived cross-module objects (threads,
//! libraries, ...) so a stale handle can be detected after its referent is
//! freed.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::RwLock;

const NIL: usize = usize::MAX;

/// Packed handle: upper 32 bits are the slot's tag at reservation time,
/// lower 32 bits are the slot index.
pub type Handle = u64;

fn pack(tag: u32, index: usize) -> Handle {
    ((tag as u64) << 32) | (index as u64 & 0xFFFF_FFFF)
}

fn unpack(handle: Handle) -> (u32, usize) {
    ((handle >> 32) as u32, (handle & 0xFFFF_FFFF) as usize)
}

/// A fixed-capacity handle allocator over payloads of type `T`.
pub struct ObjectMap<T> {
    free_next: Vec<AtomicUsize>,
    free_head: AtomicUsize,
    tags: Vec<AtomicU32>,
    payload: Vec<RwLock<Option<T>>>,
}

impl<T> ObjectMap<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut free_next = Vec::with_capacity(capacity);
        let mut tags = Vec::with_capacity(capacity);
        let mut payload = Vec::with_capacity(capacity);
        for i in 0..capacity {
            free_next.push(AtomicUsize::new(if i + 1 < capacity { i + 1 } else { NIL }));
            tags.push(AtomicU32::new(0));
            payload.push(RwLock::new(None));
        }
        ObjectMap {
            free_next,
            free_head: AtomicUsize::new(if capacity == 0 { NIL } else { 0 }),
            tags,
            payload,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tags.len()
    }

    /// Pop a free slot and return its freshly-minted handle, or `None` if
    /// the map is full.
    pub fn reserve(&self) -> Option<Handle> {
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            if head == NIL {
                return None;
            }
            let next = self.free_next[head].load(Ordering::Relaxed);
            if self
                .free_head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let tag = self.tags[head].fetch_add(1, Ordering::AcqRel) + 1;
                return Some(pack(tag, head));
            }
        }
    }

    /// Publish `value` into the slot named by `handle`. Returns `false` if
    /// the handle's tag is stale (the slot has since been freed and
    /// possibly reused).
    pub fn set(&self, handle: Handle, value: T) -> bool {
        let (tag, index) = unpack(handle);
        if index >= self.tags.len() || self.tags[index].load(Ordering::Acquire) != tag {
            return false;
        }
        *self.payload[index].write() = Some(value);
        true
    }

    /// Validate `handle` and clone its payload, or `None` if the handle is
    /// stale, the slot is empty, or out of range.
    pub fn lookup(&self, handle: Handle) -> Option<T>
    where
        T: Clone,
    {
        let (tag, index) = unpack(handle);
        if index >= self.tags.len() || self.tags[index].load(Ordering::Acquire) != tag {
            return None;
        }
        self.payload[index].read().clone()
    }

    /// Release the slot named by `handle` back to the free list. Returns
    /// `false` if the handle is already stale.
    pub fn free(&self, handle: Handle) -> bool {
        let (tag, index) = unpack(handle);
        if index >= self.tags.len() || self.tags[index].load(Ordering::Acquire) != tag {
            return false;
        }
        *self.payload[index].write() = None;
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            self.free_next[index].store(head, Ordering::Relaxed);
            if self
                .free_head
                .compare_exchange(head, index, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}
