//! Event stream — multi-producer/single-consumer, time-ordered, with
//! zero-copy bulk swap between producers and the one consumer.
//!
//! Producers `post` into a "write" block; `process` atomically swaps it with
//! the previously-consumed "read" block (a classic double buffer) and hands
//! the new read block to the caller for iteration via `first`/`next`.
//! Ordering is per-producer only: across threads, whichever `post` wins the
//! slot-reservation CAS lands first — there is no global FIFO.

use std::mem::size_of;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::log;

/// Set on an event's `flags` when the first 8 payload bytes carry an
/// absolute delivery tick rather than being plain payload.
pub const FLAG_DELAY: u16 = 0x0001;

/// Fixed event header. Every event occupies whole-word-aligned space;
/// `size` covers header + payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct EventHeader {
    pub system: u8,
    pub id: u8,
    pub flags: u16,
    pub serial: u16,
    pub size: u16,
    pub object: u64,
}

pub const HEADER_SIZE: usize = size_of::<EventHeader>();
const WORD: usize = 8;

fn align_up(n: usize) -> usize {
    (n + WORD - 1) & !(WORD - 1)
}

/// A decoded event: header plus a view onto its payload bytes. `offset` is
/// this event's byte position within its [`ReadBlock`], used by
/// [`ReadBlock::next`] to locate the following event.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub header: EventHeader,
    pub payload: &'a [u8],
    offset: usize,
}

impl<'a> Event<'a> {
    /// `true` if [`FLAG_DELAY`] is set and the first 8 payload bytes are an
    /// absolute delivery tick rather than user payload.
    #[must_use]
    pub fn is_delayed(&self) -> bool {
        self.header.flags & FLAG_DELAY != 0
    }

    /// The absolute delivery tick, if this event carries one.
    #[must_use]
    pub fn delay_tick(&self) -> Option<u64> {
        if self.is_delayed() && self.payload.len() >= 8 {
            Some(u64::from_le_bytes(self.payload[0..8].try_into().unwrap()))
        } else {
            None
        }
    }

    /// The user-visible payload: for a delayed event, the 8-byte tick
    /// header is stripped.
    #[must_use]
    pub fn user_payload(&self) -> &'a [u8] {
        if self.is_delayed() && self.payload.len() >= 8 {
            &self.payload[8..]
        } else {
            self.payload
        }
    }
}

/// Maximum bytes a single block is ever allowed to grow to. Posts that would
/// exceed this after growth are dropped (a warning is logged, not an error —
/// matching the original's silent-drop contract, Section 4.K).
const HARD_LIMIT_BYTES: usize = 64 * 1024 * 1024;
const GROWTH_CHUNK: usize = 64 * 1024;

/// A contiguous byte region holding a sequence of appended events, swapped
/// wholesale between producers and the consumer.
struct Block {
    memory: Vec<u8>,
    used: AtomicUsize,
    /// `true` while a `process()` swap is in flight — blocks a racing `post`
    /// from writing into a block mid-swap.
    swap_lock: AtomicBool,
}

impl Block {
    fn new(capacity: usize) -> Self {
        Block {
            memory: vec![0u8; capacity],
            used: AtomicUsize::new(0),
            swap_lock: AtomicBool::new(false),
        }
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }
}

/// A swapped-out block handed to the consumer by [`EventStream::process`].
/// Borrowed events from it stay valid until the next `process()` call.
pub struct ReadBlock {
    memory: Vec<u8>,
    used: usize,
}

impl ReadBlock {
    /// The first event in the block, or `None` if it is empty.
    #[must_use]
    pub fn first(&self) -> Option<Event<'_>> {
        self.at(0)
    }

    /// The event immediately following `event` within this block, or
    /// `None` at end of block.
    #[must_use]
    pub fn next<'a>(&'a self, event: &Event<'a>) -> Option<Event<'a>> {
        self.at(event.offset + align_up(event.header.size as usize))
    }

    fn at(&self, offset: usize) -> Option<Event<'_>> {
        if offset + HEADER_SIZE > self.used {
            return None;
        }
        let header = decode_header(&self.memory[offset..offset + HEADER_SIZE]);
        let total = align_up(header.size as usize);
        if offset + total > self.used {
            return None;
        }
        let payload_len = header.size as usize - HEADER_SIZE;
        let payload = &self.memory[offset + HEADER_SIZE..offset + HEADER_SIZE + payload_len];
        Some(Event { header, payload, offset })
    }

    /// Iterate every event in post order within this block.
    pub fn iter(&self) -> ReadBlockIter<'_> {
        ReadBlockIter { block: self, offset: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }
}

pub struct ReadBlockIter<'a> {
    block: &'a ReadBlock,
    offset: usize,
}

impl<'a> Iterator for ReadBlockIter<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        let event = self.block.at(self.offset)?;
        self.offset += align_up(event.header.size as usize);
        Some(event)
    }
}

fn encode_header(buf: &mut [u8], header: &EventHeader) {
    buf[0] = header.system;
    buf[1] = header.id;
    buf[2..4].copy_from_slice(&header.flags.to_le_bytes());
    buf[4..6].copy_from_slice(&header.serial.to_le_bytes());
    buf[6..8].copy_from_slice(&header.size.to_le_bytes());
    buf[8..16].copy_from_slice(&header.object.to_le_bytes());
}

fn decode_header(buf: &[u8]) -> EventHeader {
    EventHeader {
        system: buf[0],
        id: buf[1],
        flags: u16::from_le_bytes(buf[2..4].try_into().unwrap()),
        serial: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
        size: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
        object: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
    }
}

/// Something `post` can wake when it successfully appends an event — the
/// event stream has no upward dependency on the beacon primitive itself, so
/// this trait is the seam `foundation-platform`'s beacon plugs into.
pub trait Fireable: Send + Sync {
    fn fire(&self);
}

/// A multi-producer/single-consumer event stream.
pub struct EventStream {
    write: Mutex<Block>,
    read_pending: Mutex<Option<Block>>,
    serial: AtomicUsize,
    beacon: Mutex<Option<std::sync::Arc<dyn Fireable>>>,
}

impl EventStream {
    #[must_use]
    pub fn new(initial_capacity: usize) -> Self {
        EventStream {
            write: Mutex::new(Block::new(initial_capacity.max(GROWTH_CHUNK))),
            read_pending: Mutex::new(None),
            serial: AtomicUsize::new(0),
            beacon: Mutex::new(None),
        }
    }

    /// Arrange for `post` to also fire `beacon` on every successful append.
    pub fn set_beacon(&self, beacon: std::sync::Arc<dyn Fireable>) {
        *self.beacon.lock().unwrap_or_else(|e| e.into_inner()) = Some(beacon);
    }

    /// Append one event. Returns `false` (and logs a warning) if the event
    /// would exceed the hard block-size limit even after growth — dropped,
    /// not an error, matching Section 4.K.
    pub fn post(&self, system: u8, id: u8, object: u64, flags: u16, payload: &[u8]) -> bool {
        let size = HEADER_SIZE + payload.len();
        let total = align_up(size);
        if size > u16::MAX as usize {
            log::warn("foundation::event", "event payload too large for u16 size field");
            return false;
        }

        let mut write = self.write.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_capacity(&mut write, total);
        if total > write.capacity() {
            log::warn("foundation::event", "event dropped: exceeds hard block-size limit");
            return false;
        }

        let used = write.used.load(Ordering::Relaxed);
        if used + total > write.capacity() {
            log::warn("foundation::event", "event dropped: block full at hard limit");
            return false;
        }

        let serial = (self.serial.fetch_add(1, Ordering::Relaxed) & 0xFFFF) as u16;
        let header = EventHeader {
            system,
            id,
            flags,
            serial,
            size: size as u16,
            object,
        };
        encode_header(&mut write.memory[used..used + HEADER_SIZE], &header);
        write.memory[used + HEADER_SIZE..used + HEADER_SIZE + payload.len()].copy_from_slice(payload);
        write.used.store(used + total, Ordering::Release);
        drop(write);

        if let Some(beacon) = self.beacon.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            beacon.fire();
        }
        true
    }

    /// Post a delayed event: `due_tick` is prepended to `payload` as the
    /// absolute delivery tick.
    pub fn post_delayed(&self, system: u8, id: u8, object: u64, due_tick: u64, payload: &[u8]) -> bool {
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(&due_tick.to_le_bytes());
        buf.extend_from_slice(payload);
        self.post(system, id, object, FLAG_DELAY, &buf)
    }

    fn ensure_capacity(&self, write: &mut Block, needed_total: usize) {
        let used = write.used.load(Ordering::Relaxed);
        while used + needed_total > write.capacity() && write.capacity() < HARD_LIMIT_BYTES {
            let grown = (write.capacity() + GROWTH_CHUNK).min(HARD_LIMIT_BYTES);
            let mut new_memory = vec![0u8; grown];
            new_memory[..used].copy_from_slice(&write.memory[..used]);
            write.memory = new_memory;
        }
    }

    /// Atomically swap the write block out for a fresh one and return the
    /// previous write block's contents for iteration. Delayed events not
    /// yet due are re-queued into the new write block so they survive until
    /// due. `now_tick` is the caller's current monotonic tick, compared
    /// against each delayed event's due tick.
    pub fn process(&self, now_tick: u64) -> ReadBlock {
        let mut write = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let used = write.used.load(Ordering::Acquire);
        let swapped = std::mem::replace(&mut *write, Block::new(write.capacity()));
        drop(write);

        let read = ReadBlock {
            memory: swapped.memory,
            used,
        };

        let mut not_yet_due = Vec::new();
        for event in read.iter() {
            if event.is_delayed() {
                if let Some(due) = event.delay_tick() {
                    if due > now_tick {
                        not_yet_due.push((
                            event.header.system,
                            event.header.id,
                            event.header.object,
                            due,
                            event.user_payload().to_vec(),
                        ));
                    }
                }
            }
        }
        for (system, id, object, due, payload) in not_yet_due.iter() {
            self.post_delayed(*system, *id, *object, *due, payload);
        }

        if not_yet_due.is_empty() {
            return read;
        }

        // Rebuild the read block excluding the re-queued not-yet-due events
        // so callers only see events due at or before `now_tick`.
        let mut filtered = Vec::with_capacity(read.used);
        for event in read.iter() {
            let skip = event.is_delayed()
                && event
                    .delay_tick()
                    .is_some_and(|due| due > now_tick);
            if skip {
                continue;
            }
            let total = align_up(event.header.size as usize);
            let start = filtered.len();
            filtered.resize(start + total, 0);
            encode_header(&mut filtered[start..start + HEADER_SIZE], &event.header);
            filtered[start + HEADER_SIZE..start + event.header.size as usize]
                .copy_from_slice(event.payload);
        }
        let filtered_used = filtered.len();
        ReadBlock { memory: filtered, used: filtered_used }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn post_then_process_yields_event_in_order() {
        let stream = EventStream::new(4096);
        stream.post(1, 2, 42, 0, b"hello");
        stream.post(1, 3, 43, 0, b"world");
        let block = stream.process(0);
        let events: Vec<_> = block.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].header.id, 2);
        assert_eq!(events[0].user_payload(), b"hello");
        assert_eq!(events[1].header.id, 3);
        assert_eq!(events[1].user_payload(), b"world");
    }

    #[test]
    fn process_without_posts_yields_empty_block() {
        let stream = EventStream::new(1024);
        let block = stream.process(0);
        assert!(block.is_empty());
    }

    #[test]
    fn delayed_event_not_visible_before_due_tick() {
        let stream = EventStream::new(4096);
        stream.post_delayed(1, 2, 0, 500, b"payload");

        let early = stream.process(100);
        assert!(early.is_empty(), "delayed event must not surface before due");

        let on_time = stream.process(500);
        let events: Vec<_> = on_time.iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_payload(), b"payload");

        // Must not resurface on a later process() call.
        let later = stream.process(1000);
        assert!(later.is_empty());
    }

    #[test]
    fn block_grows_to_accept_large_posts() {
        let stream = EventStream::new(64);
        let payload = vec![7u8; 4000];
        assert!(stream.post(1, 1, 0, 0, &payload));
        let block = stream.process(0);
        let events: Vec<_> = block.iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_payload().len(), 4000);
    }

    struct CountingBeacon(std::sync::atomic::AtomicUsize);
    impl Fireable for CountingBeacon {
        fn fire(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn set_beacon_fires_on_post() {
        let stream = EventStream::new(1024);
        let beacon = Arc::new(CountingBeacon(std::sync::atomic::AtomicUsize::new(0)));
        stream.set_beacon(beacon.clone());
        stream.post(1, 1, 0, 0, b"x");
        stream.post(1, 1, 0, 0, b"y");
        assert_eq!(beacon.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn oversized_post_is_dropped_not_errored() {
        let stream = EventStream::new(1024);
        let huge = vec![0u8; 70 * 1024 * 1024];
        assert!(!stream.post(1, 1, 0, 0, &huge));
    }
}
