//! Lock-free fixed-capacity key/value tables with atomic slot claim, in
//! 32-bit ([`HashTable32`]) and 64-bit ([`HashTable64`]) key/value widths.
//!
//! Keys are mixed with a bit-avalanche finalizer (Murmur-style xor-shift/
//! multiply chain, width-matched to each table); linear probing on
//! collision; `set` CAS-claims an empty slot; `erase` clears the value and
//! leaves a weak tombstone key so the slot can be reused by a later `set`
//! of the same key.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[inline]
fn mix64(mut key: u64) -> u64 {
    key ^= key >> 33;
    key = key.wrapping_mul(0xff51_afd7_ed55_8ccd);
    key ^= key >> 33;
    key = key.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    key ^= key >> 33;
    key
}

#[inline]
fn mix32(mut key: u32) -> u32 {
    key ^= key >> 16;
    key = key.wrapping_mul(0x85eb_ca6b);
    key ^= key >> 13;
    key = key.wrapping_mul(0xc2b2_ae35);
    key ^= key >> 16;
    key
}

struct Entry {
    key: AtomicU64,
    value: AtomicU64,
}

/// Fixed-capacity, lock-free, 64-bit key/value table.
///
/// Key `0` means "empty slot"; value `0` means "erased" (a tombstone-less
/// design — the key remains, marking the slot reusable). `set`/`get`/`erase`
/// are safe to call concurrently from multiple threads; `clear` takes `&mut
/// self` and is not concurrent-safe.
pub struct HashTable64 {
    entries: Vec<Entry>,
    capacity: usize,
}

impl HashTable64 {
    /// Create a table with room for `capacity` entries. Callers should size
    /// for roughly 2x expected peak occupancy — a full table degrades to a
    /// spin-yield retry loop on `set`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            entries.push(Entry {
                key: AtomicU64::new(0),
                value: AtomicU64::new(0),
            });
        }
        HashTable64 { entries, capacity }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied (non-empty-key) slots. O(capacity).
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key.load(Ordering::Acquire) != 0)
            .count()
    }

    /// Claim a slot for `key` (CAS-ing an empty slot, or finding the
    /// existing one) and store `value`. Both `key` and `value` must be
    /// non-zero.
    ///
    /// # Panics
    /// Panics if `key == 0` or `value == 0` (mirrors the original's
    /// assertions — zero is reserved as the empty/tombstone sentinel).
    pub fn set(&self, key: u64, value: u64) {
        assert!(key != 0, "hashtable key must be non-zero");
        assert!(value != 0, "hashtable value must be non-zero");

        let start = (mix64(key) as usize) % self.capacity;
        let mut index = start;
        loop {
            let entry = &self.entries[index];
            let current = entry.key.load(Ordering::Acquire);
            if current != key {
                if current != 0
                    || entry
                        .key
                        .compare_exchange(0, key, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    index = (index + 1) % self.capacity;
                    if index == start {
                        std::thread::yield_now();
                    }
                    continue;
                }
            }
            entry.value.store(value, Ordering::Release);
            return;
        }
    }

    /// Look up `key`. Returns `0` if absent or erased.
    #[must_use]
    pub fn get(&self, key: u64) -> u64 {
        assert!(key != 0, "hashtable key must be non-zero");
        let start = (mix64(key) as usize) % self.capacity;
        let mut index = start;
        loop {
            let entry = &self.entries[index];
            let current = entry.key.load(Ordering::Acquire);
            if current == key {
                return entry.value.load(Ordering::Acquire);
            }
            if current == 0 {
                return 0;
            }
            index = (index + 1) % self.capacity;
            if index == start {
                return 0;
            }
        }
    }

    /// Erase `key` by zeroing its value. The key itself stays as a weak
    /// tombstone so a later `set` on the same key reuses the slot.
    pub fn erase(&self, key: u64) {
        assert!(key != 0, "hashtable key must be non-zero");
        let start = (mix64(key) as usize) % self.capacity;
        let mut index = start;
        loop {
            let entry = &self.entries[index];
            let current = entry.key.load(Ordering::Acquire);
            if current == key {
                entry.value.store(0, Ordering::Release);
                return;
            }
            if current == 0 {
                return;
            }
            index = (index + 1) % self.capacity;
            if index == start {
                return;
            }
        }
    }

    /// Reset every slot to empty. Not safe to call concurrently with
    /// `set`/`get`/`erase` from other threads.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.key.store(0, Ordering::Relaxed);
            entry.value.store(0, Ordering::Relaxed);
        }
    }
}

struct Entry32 {
    key: AtomicU32,
    value: AtomicU32,
}

/// Fixed-capacity, lock-free, 32-bit key/value table. Same contract as
/// [`HashTable64`], narrowed to `u32` keys and values via the 32-bit
/// finalizer [`mix32`].
pub struct HashTable32 {
    entries: Vec<Entry32>,
    capacity: usize,
}

impl HashTable32 {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            entries.push(Entry32 {
                key: AtomicU32::new(0),
                value: AtomicU32::new(0),
            });
        }
        HashTable32 { entries, capacity }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key.load(Ordering::Acquire) != 0)
            .count()
    }

    /// # Panics
    /// Panics if `key == 0` or `value == 0`.
    pub fn set(&self, key: u32, value: u32) {
        assert!(key != 0, "hashtable key must be non-zero");
        assert!(value != 0, "hashtable value must be non-zero");

        let start = (mix32(key) as usize) % self.capacity;
        let mut index = start;
        loop {
            let entry = &self.entries[index];
            let current = entry.key.load(Ordering::Acquire);
            if current != key {
                if current != 0
                    || entry
                        .key
                        .compare_exchange(0, key, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    index = (index + 1) % self.capacity;
                    if index == start {
                        std::thread::yield_now();
                    }
                    continue;
                }
            }
            entry.value.store(value, Ordering::Release);
            return;
        }
    }

    /// Look up `key`. Returns `0` if absent or erased.
    #[must_use]
    pub fn get(&self, key: u32) -> u32 {
        assert!(key != 0, "hashtable key must be non-zero");
        let start = (mix32(key) as usize) % self.capacity;
        let mut index = start;
        loop {
            let entry = &self.entries[index];
            let current = entry.key.load(Ordering::Acquire);
            if current == key {
                return entry.value.load(Ordering::Acquire);
            }
            if current == 0 {
                return 0;
            }
            index = (index + 1) % self.capacity;
            if index == start {
                return 0;
            }
        }
    }

    /// Erase `key` by zeroing its value, leaving a weak tombstone key.
    pub fn erase(&self, key: u32) {
        assert!(key != 0, "hashtable key must be non-zero");
        let start = (mix32(key) as usize) % self.capacity;
        let mut index = start;
        loop {
            let entry = &self.entries[index];
            let current = entry.key.load(Ordering::Acquire);
            if current == key {
                entry.value.store(0, Ordering::Release);
                return;
            }
            if current == 0 {
                return;
            }
            index = (index + 1) % self.capacity;
            if index == start {
                return;
            }
        }
    }

    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.key.store(0, Ordering::Relaxed);
            entry.value.store(0, Ordering::Relaxed);
        }
    }
}
