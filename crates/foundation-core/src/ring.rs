//! Ring buffer and the blocking ring-buffer stream built atop it.
//!
//! The ring itself is the lock-free single-producer/single-consumer core:
//! the writer only ever touches `offset_write`, the reader only ever touches
//! `offset_read`. Blocking is layered on top with two semaphores —
//! `signal_read` wakes a stalled writer once the reader has freed space,
//! `signal_write` wakes a stalled reader once the writer has produced data —
//! exactly as Section 4.L specifies.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::sync::semaphore::Semaphore;

/// Lock-free SPSC ring buffer. One slot is always left unused so
/// `write == read` unambiguously means empty (never confused with full).
pub struct RingBuffer {
    buffer: Box<[std::cell::UnsafeCell<u8>]>,
    capacity: usize,
    offset_read: AtomicUsize,
    offset_write: AtomicUsize,
    total_read: AtomicU64,
    total_written: AtomicU64,
}

// SAFETY: the ring enforces single-producer/single-consumer discipline on
// the byte region itself; reader and writer never touch overlapping index
// ranges because capacity reserves one slot to disambiguate full/empty.
unsafe impl Sync for RingBuffer {}
unsafe impl Send for RingBuffer {}

impl RingBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let buffer = (0..capacity)
            .map(|_| std::cell::UnsafeCell::new(0u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        RingBuffer {
            buffer,
            capacity,
            offset_read: AtomicUsize::new(0),
            offset_write: AtomicUsize::new(0),
            total_read: AtomicU64::new(0),
            total_written: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity - 1
    }

    #[must_use]
    pub fn total_read(&self) -> u64 {
        self.total_read.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.total_written.load(Ordering::Acquire)
    }

    /// Bytes immediately available to read without blocking.
    #[must_use]
    pub fn readable(&self) -> usize {
        let w = self.offset_write.load(Ordering::Acquire);
        let r = self.offset_read.load(Ordering::Relaxed);
        (w + self.capacity - r) % self.capacity
    }

    /// Bytes immediately available to write without blocking.
    #[must_use]
    pub fn writable(&self) -> usize {
        self.capacity() - self.readable()
    }

    /// Copy up to `buf.len()` available bytes out. Returns the number
    /// actually copied (may be less than requested, or zero).
    pub fn read_available(&self, buf: &mut [u8]) -> usize {
        let mut r = self.offset_read.load(Ordering::Relaxed);
        let w = self.offset_write.load(Ordering::Acquire);
        let available = (w + self.capacity - r) % self.capacity;
        let n = buf.len().min(available);
        for slot in buf.iter_mut().take(n) {
            // SAFETY: index `r` is owned exclusively by the reader side;
            // the writer never writes at or behind `offset_read`.
            *slot = unsafe { *self.buffer[r].get() };
            r = (r + 1) % self.capacity;
        }
        self.offset_read.store(r, Ordering::Release);
        self.total_read.fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    /// Copy up to `data.len()` bytes in, bounded by free space. Returns the
    /// number actually copied.
    pub fn write_available(&self, data: &[u8]) -> usize {
        let mut w = self.offset_write.load(Ordering::Relaxed);
        let r = self.offset_read.load(Ordering::Acquire);
        let free = self.capacity() - (w + self.capacity - r) % self.capacity;
        let n = data.len().min(free);
        for &byte in data.iter().take(n) {
            // SAFETY: index `w` is owned exclusively by the writer side.
            unsafe { *self.buffer[w].get() = byte };
            w = (w + 1) % self.capacity;
        }
        self.offset_write.store(w, Ordering::Release);
        self.total_written.fetch_add(n as u64, Ordering::Relaxed);
        n
    }
}

/// Blocking stream bridging a producer thread to a consumer thread through a
/// bounded [`RingBuffer`]. `total_size`, if set, bounds the stream: reads
/// past it return end-of-stream rather than blocking forever.
pub struct RingBufferStream {
    ring: Arc<RingBuffer>,
    signal_read: Semaphore,
    signal_write: Semaphore,
    total_size: Option<u64>,
    closed: std::sync::atomic::AtomicBool,
}

impl RingBufferStream {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        RingBufferStream {
            ring: Arc::new(RingBuffer::new(capacity)),
            signal_read: Semaphore::new(0),
            signal_write: Semaphore::new(0),
            total_size: None,
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Bound the logical stream length. A reader that reaches it observes
    /// end-of-stream instead of blocking for more.
    pub fn set_total_size(&mut self, size: u64) {
        self.total_size = Some(size);
    }

    #[must_use]
    pub fn eos(&self) -> bool {
        if self.closed.load(Ordering::Acquire) && self.ring.readable() == 0 {
            return true;
        }
        match self.total_size {
            Some(total) => self.ring.total_read() >= total,
            None => false,
        }
    }

    /// Mark the stream closed: no more writes will arrive. Wakes any
    /// blocked reader so it can observe end-of-stream.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.signal_write.post();
    }

    /// Blocking read: fills `buf` completely unless end-of-stream is
    /// reached first, returning the number of bytes actually read.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.ring.read_available(&mut buf[filled..]);
            if n > 0 {
                filled += n;
                self.signal_read.post();
                continue;
            }
            if self.eos() {
                break;
            }
            // Nothing available: stall until the writer produces more or
            // closes the stream.
            self.signal_write.try_wait(Some(std::time::Duration::from_millis(50)));
        }
        filled
    }

    /// Blocking write: writes `data` completely, stalling whenever the ring
    /// is full until the reader frees space.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut written = 0;
        while written < data.len() {
            let n = self.ring.write_available(&data[written..]);
            if n > 0 {
                written += n;
                self.signal_write.post();
                continue;
            }
            self.signal_read.try_wait(Some(std::time::Duration::from_millis(50)));
        }
        written
    }

    /// Forward-only seek, implemented by reading and discarding bytes —
    /// matches Section 4.L: the ring has no random access.
    pub fn seek_forward(&self, count: u64) -> u64 {
        let mut remaining = count;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let chunk = remaining.min(scratch.len() as u64) as usize;
            let n = self.read(&mut scratch[..chunk]);
            if n == 0 {
                break;
            }
            remaining -= n as u64;
        }
        count - remaining
    }

    #[must_use]
    pub fn ring(&self) -> Arc<RingBuffer> {
        Arc::clone(&self.ring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_threaded_round_trip() {
        let ring = RingBuffer::new(16);
        let data = b"hello world";
        let n = ring.write_available(data);
        assert_eq!(n, data.len());
        let mut out = vec![0u8; data.len()];
        let read = ring.read_available(&mut out);
        assert_eq!(read, data.len());
        assert_eq!(&out, data);
    }

    #[test]
    fn capacity_reserves_one_slot() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.capacity(), 7);
        let data = [0u8; 7];
        assert_eq!(ring.write_available(&data), 7);
        assert_eq!(ring.write_available(&[9]), 0, "ring must report full with one slot reserved");
    }

    #[test]
    fn blocking_bridge_delivers_large_payload_across_threads() {
        let stream = Arc::new(RingBufferStream::new(4096));
        let total = 2 * 1024 * 1024;
        let source: Vec<u8> = (0..total).map(|i| (i % 256) as u8).collect();

        let writer_stream = Arc::clone(&stream);
        let writer_source = source.clone();
        let writer = thread::spawn(move || {
            let mut offset = 0;
            while offset < writer_source.len() {
                let end = (offset + 997).min(writer_source.len());
                writer_stream.write(&writer_source[offset..end]);
                offset = end;
            }
            writer_stream.close();
        });

        let mut received = Vec::with_capacity(total);
        let mut buf = [0u8; 1500];
        loop {
            let n = stream.read(&mut buf);
            if n == 0 {
                if stream.eos() {
                    break;
                }
                continue;
            }
            received.extend_from_slice(&buf[..n]);
            if received.len() >= total {
                break;
            }
        }
        writer.join().unwrap();
        assert_eq!(received, source);
        assert_eq!(stream.ring().total_written(), total as u64);
        assert_eq!(stream.ring().total_read(), total as u64);
    }

    #[test]
    fn total_size_bounds_end_of_stream() {
        let mut stream = RingBufferStream::new(64);
        stream.set_total_size(5);
        stream.write(b"hello there");
        let mut out = [0u8; 5];
        let n = stream.read(&mut out);
        assert_eq!(n, 5);
        assert!(stream.eos());
    }

    #[test]
    fn seek_forward_discards_bytes() {
        let stream = RingBufferStream::new(64);
        stream.write(b"0123456789");
        let advanced = stream.seek_forward(4);
        assert_eq!(advanced, 4);
        let mut out = [0u8; 6];
        stream.read(&mut out);
        assert_eq!(&out, b"456789");
    }
}
