//! Stream abstraction — a byte-sequence contract with byte-order-aware
//! typed I/O, dispatched dynamically over heterogeneous backing stores.
//!
//! [`Stream`] is the trait every backing store implements — [`BufferStream`],
//! [`RingStreamAdapter`], [`FileStream`], and whatever a host application
//! adds for sockets/assets; [`StreamExt`] layers typed reads/writes,
//! binary-mode detection, and `md5()` on top of it uniformly, mirroring the
//! original's split between the vtable and the convenience helpers built
//! over it. [`stream_open`] resolves a `scheme://` URL to one of these,
//! mirroring the original's `path_protocol`-dispatched `stream_open`.

use std::fs::{File, OpenOptions};
use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
use std::path::Path;

use crate::digest::md5::Md5;
use crate::path::path_protocol;
use crate::ring::RingBufferStream;

/// Byte order a stream's typed reads/writes honor. Default is little-endian,
/// per Section 6's wire conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::Little
    }
}

/// Shared header fields every stream implementation carries, independent of
/// its backing store.
#[derive(Debug, Clone, Default)]
pub struct StreamHeader {
    pub byte_order: ByteOrder,
    pub binary: bool,
    pub sequential: bool,
    pub reliable: bool,
    pub inorder: bool,
    pub path: String,
    pub mode: StreamMode,
    pub mod_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    #[default]
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// The vtable every stream backing store implements.
pub trait Stream: Send {
    /// Read up to `buf.len()` bytes; returns the number actually read
    /// (`0` at end-of-stream).
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write `data`; returns the number of bytes actually accepted.
    fn write(&mut self, data: &[u8]) -> usize;

    fn eos(&self) -> bool;

    fn flush(&mut self) {}

    /// Truncate (or zero-extend) the stream to exactly `size` bytes.
    fn truncate(&mut self, size: u64);

    fn size(&self) -> u64;

    /// Absolute seek. Streams that only support forward seeking (e.g. the
    /// ring-buffer stream) implement this by reading-and-discarding.
    fn seek(&mut self, position: u64);

    fn tell(&self) -> u64;

    fn lastmod(&self) -> u64 {
        0
    }

    /// Bytes immediately available without blocking, if the backing store
    /// can report it cheaply; `None` if unknown.
    fn available_read(&self) -> Option<usize> {
        None
    }

    fn header(&self) -> &StreamHeader;

    fn header_mut(&mut self) -> &mut StreamHeader;
}

/// Typed, byte-order-aware reads/writes layered over any [`Stream`].
pub trait StreamExt: Stream {
    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|v| v != 0)
    }

    fn read_i8(&mut self) -> Option<i8> {
        self.read_u8().map(|v| v as i8)
    }

    fn read_u8(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        if self.read(&mut buf) == 1 {
            Some(buf[0])
        } else {
            None
        }
    }

    fn read_i16(&mut self) -> Option<i16> {
        self.read_u16().map(|v| v as i16)
    }

    fn read_u16(&mut self) -> Option<u16> {
        let mut buf = [0u8; 2];
        if self.read(&mut buf) != 2 {
            return None;
        }
        Some(match self.header().byte_order {
            ByteOrder::Little => u16::from_le_bytes(buf),
            ByteOrder::Big => u16::from_be_bytes(buf),
        })
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.read_u32().map(|v| v as i32)
    }

    fn read_u32(&mut self) -> Option<u32> {
        let mut buf = [0u8; 4];
        if self.read(&mut buf) != 4 {
            return None;
        }
        Some(match self.header().byte_order {
            ByteOrder::Little => u32::from_le_bytes(buf),
            ByteOrder::Big => u32::from_be_bytes(buf),
        })
    }

    fn read_i64(&mut self) -> Option<i64> {
        self.read_u64().map(|v| v as i64)
    }

    fn read_u64(&mut self) -> Option<u64> {
        let mut buf = [0u8; 8];
        if self.read(&mut buf) != 8 {
            return None;
        }
        Some(match self.header().byte_order {
            ByteOrder::Little => u64::from_le_bytes(buf),
            ByteOrder::Big => u64::from_be_bytes(buf),
        })
    }

    fn read_f32(&mut self) -> Option<f32> {
        self.read_u32().map(f32::from_bits)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Length-prefixed (u32) string.
    fn read_string(&mut self) -> Option<String> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        if self.read(&mut buf) != len {
            return None;
        }
        String::from_utf8(buf).ok()
    }

    fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    fn write_u16(&mut self, value: u16) {
        let bytes = match self.header().byte_order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.write(&bytes);
    }

    fn write_u32(&mut self, value: u32) {
        let bytes = match self.header().byte_order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.write(&bytes);
    }

    fn write_u64(&mut self, value: u64) {
        let bytes = match self.header().byte_order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.write(&bytes);
    }

    fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.write(value.as_bytes());
    }

    /// Read until `delimiter` (exclusive) or end-of-stream, appending into
    /// `out`. Returns the number of bytes appended (including a consumed
    /// delimiter, if one was found).
    fn read_line(&mut self, delimiter: u8, out: &mut Vec<u8>) -> usize {
        let mut total = 0;
        let mut byte = [0u8; 1];
        loop {
            if self.read(&mut byte) == 0 {
                break;
            }
            total += 1;
            if byte[0] == delimiter {
                break;
            }
            out.push(byte[0]);
        }
        total
    }

    /// Peek `n` bytes (seeking back afterward) and classify the stream as
    /// binary if any byte falls outside printable-ASCII + whitespace.
    /// Sequential streams can't seek back, so this only applies to
    /// non-sequential streams.
    fn determine_binary_mode(&mut self, n: usize) -> bool {
        if self.header().sequential {
            return self.header().binary;
        }
        let start = self.tell();
        let mut buf = vec![0u8; n];
        let read = self.read(&mut buf);
        self.seek(start);
        let binary = buf[..read].iter().any(|&b| !is_text_byte(b));
        self.header_mut().binary = binary;
        binary
    }

    /// Stream-to-end MD5. In text mode, `\r` bytes are filtered so
    /// logically identical content hashes identically across platforms.
    fn md5(&mut self) -> [u8; 16] {
        let text_mode = !self.header().binary;
        let mut hasher = Md5::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = self.read(&mut buf);
            if n == 0 {
                break;
            }
            if text_mode {
                let filtered: Vec<u8> = buf[..n].iter().copied().filter(|&b| b != b'\r').collect();
                hasher.update(&filtered);
            } else {
                hasher.update(&buf[..n]);
            }
        }
        hasher.finalize()
    }
}

impl<T: Stream + ?Sized> StreamExt for T {}

fn is_text_byte(b: u8) -> bool {
    (0x20..=0x7e).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r')
}

/// Auto-growing in-memory buffer stream. `{buffer, current, size, capacity,
/// owns, grows}` — writes past capacity grow the buffer only when both
/// `owns` and `grows` hold; otherwise the write truncates at capacity.
pub struct BufferStream {
    buffer: Vec<u8>,
    current: usize,
    furthest_write: usize,
    owns: bool,
    grows: bool,
    header: StreamHeader,
}

impl BufferStream {
    #[must_use]
    pub fn new() -> Self {
        BufferStream {
            buffer: Vec::new(),
            current: 0,
            furthest_write: 0,
            owns: true,
            grows: true,
            header: StreamHeader {
                path: "buffer://".into(),
                ..Default::default()
            },
        }
    }

    /// Wrap an existing byte vector as a fixed-capacity, non-growing
    /// buffer — mirrors the original's "does not own, does not grow"
    /// external-buffer mode.
    #[must_use]
    pub fn from_fixed(data: Vec<u8>) -> Self {
        let furthest_write = data.len();
        BufferStream {
            buffer: data,
            current: 0,
            furthest_write,
            owns: false,
            grows: false,
            header: StreamHeader {
                path: "buffer://".into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.furthest_write]
    }
}

impl Default for BufferStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for BufferStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let available = self.furthest_write.saturating_sub(self.current);
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.buffer[self.current..self.current + n]);
        self.current += n;
        n
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let capacity = self.buffer.len();
        let space = capacity.saturating_sub(self.current);
        let n = if data.len() > space {
            if self.owns && self.grows {
                let needed = self.current + data.len();
                self.buffer.resize(needed, 0);
                data.len()
            } else {
                space
            }
        } else {
            data.len()
        };
        self.buffer[self.current..self.current + n].copy_from_slice(&data[..n]);
        self.current += n;
        self.furthest_write = self.furthest_write.max(self.current);
        n
    }

    fn eos(&self) -> bool {
        self.current >= self.furthest_write
    }

    fn truncate(&mut self, size: u64) {
        let size = size as usize;
        self.buffer.resize(size, 0);
        self.furthest_write = size;
        self.current = self.current.min(size);
    }

    fn size(&self) -> u64 {
        self.furthest_write as u64
    }

    fn seek(&mut self, position: u64) {
        self.current = (position as usize).min(self.buffer.len());
    }

    fn tell(&self) -> u64 {
        self.current as u64
    }

    fn available_read(&self) -> Option<usize> {
        Some(self.furthest_write.saturating_sub(self.current))
    }

    fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StreamHeader {
        &mut self.header
    }
}

/// Adapts [`RingBufferStream`] (Section 4.L) to the [`Stream`] vtable.
pub struct RingStreamAdapter {
    inner: RingBufferStream,
    position: u64,
    header: StreamHeader,
}

impl RingStreamAdapter {
    #[must_use]
    pub fn new(inner: RingBufferStream) -> Self {
        RingStreamAdapter {
            inner,
            position: 0,
            header: StreamHeader {
                path: "ringbuffer://".into(),
                sequential: true,
                reliable: true,
                inorder: true,
                ..Default::default()
            },
        }
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

impl Stream for RingStreamAdapter {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.inner.read(buf);
        self.position += n as u64;
        n
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.inner.write(data)
    }

    fn eos(&self) -> bool {
        self.inner.eos()
    }

    fn truncate(&mut self, _size: u64) {
        // Ring streams have no truncate semantics; no-op.
    }

    fn size(&self) -> u64 {
        self.inner.ring().total_written()
    }

    fn seek(&mut self, position: u64) {
        if position > self.position {
            self.position += self.inner.seek_forward(position - self.position);
        }
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn available_read(&self) -> Option<usize> {
        Some(self.inner.ring().readable())
    }

    fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StreamHeader {
        &mut self.header
    }
}

/// Adapts a regular filesystem file to the [`Stream`] vtable.
pub struct FileStream {
    file: File,
    header: StreamHeader,
}

impl FileStream {
    /// Open `path` under `mode`. `WriteOnly`/`ReadWrite` create the file if
    /// it does not already exist; `ReadOnly` does not.
    pub fn open(path: &Path, mode: StreamMode) -> std::io::Result<Self> {
        let mut opts = OpenOptions::new();
        match mode {
            StreamMode::ReadOnly => {
                opts.read(true);
            }
            StreamMode::WriteOnly => {
                opts.write(true).create(true);
            }
            StreamMode::ReadWrite => {
                opts.read(true).write(true).create(true);
            }
        }
        let file = opts.open(path)?;
        let mod_time = file
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(FileStream {
            file,
            header: StreamHeader {
                path: format!("file://{}", path.display()),
                mode,
                mod_time,
                ..Default::default()
            },
        })
    }
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.file.read(buf).unwrap_or(0)
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.file.write(data).unwrap_or(0)
    }

    fn eos(&self) -> bool {
        self.tell() >= self.size()
    }

    fn flush(&mut self) {
        let _ = self.file.flush();
    }

    fn truncate(&mut self, size: u64) {
        let _ = self.file.set_len(size);
    }

    fn size(&self) -> u64 {
        self.file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn seek(&mut self, position: u64) {
        let _ = self.file.seek(SeekFrom::Start(position));
    }

    fn tell(&self) -> u64 {
        self.file.stream_position().unwrap_or(0)
    }

    fn lastmod(&self) -> u64 {
        self.header.mod_time
    }

    fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StreamHeader {
        &mut self.header
    }
}

/// Resolve a `scheme://...` URL to a backing stream, the same way the
/// original's `stream_open` dispatches on `path_protocol`.
///
/// Only `file://` is resolvable from a bare URL string: `buffer://` and
/// `ringbuffer://` name an already-live in-process object (the original
/// embeds its raw pointer in the URL itself), and this rewrite deliberately
/// has no safe way to resurrect a `BufferStream`/`RingStreamAdapter` from a
/// bare string — callers construct those directly instead. `asset://` is an
/// external-collaborator concern (Section 1 Out of scope) and is not
/// resolvable here.
pub fn stream_open(url: &str, mode: StreamMode) -> Option<Box<dyn Stream>> {
    match path_protocol(url)? {
        "file" => {
            let path = url.strip_prefix("file://")?;
            FileStream::open(Path::new(path), mode)
                .ok()
                .map(|s| Box::new(s) as Box<dyn Stream>)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_u32_round_trips_little_endian() {
        let mut s = BufferStream::new();
        s.write_u32(0xDEAD_BEEF);
        s.seek(0);
        assert_eq!(s.read_u32(), Some(0xDEAD_BEEF));
    }

    #[test]
    fn byte_order_round_trips_for_every_value() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            for x in [0u32, 1, 0xFFFF_FFFF, 0x1234_5678, 42] {
                let mut s = BufferStream::new();
                s.header_mut().byte_order = order;
                s.write_u32(x);
                s.seek(0);
                assert_eq!(s.read_u32(), Some(x));
            }
        }
    }

    #[test]
    fn string_round_trip() {
        let mut s = BufferStream::new();
        s.write_string("hello stream");
        s.seek(0);
        assert_eq!(s.read_string().as_deref(), Some("hello stream"));
    }

    #[test]
    fn fixed_buffer_truncates_writes_past_capacity() {
        let mut s = BufferStream::from_fixed(vec![0u8; 4]);
        let written = s.write(b"abcdef");
        assert_eq!(written, 4);
        assert_eq!(s.as_slice(), b"abcd");
    }

    #[test]
    fn growing_buffer_accepts_writes_past_initial_capacity() {
        let mut s = BufferStream::new();
        let written = s.write(b"abcdef");
        assert_eq!(written, 6);
        assert_eq!(s.as_slice(), b"abcdef");
    }

    #[test]
    fn read_line_splits_on_delimiter() {
        let mut s = BufferStream::new();
        s.write(b"first\nsecond\nthird");
        s.seek(0);
        let mut line = Vec::new();
        let n = s.read_line(b'\n', &mut line);
        assert_eq!(n, 6);
        assert_eq!(line, b"first");
    }

    #[test]
    fn determine_binary_mode_detects_non_text_bytes() {
        let mut s = BufferStream::new();
        s.write(&[0x00, 0x01, 0x02]);
        s.seek(0);
        assert!(s.determine_binary_mode(3));
        assert_eq!(s.tell(), 0, "peek must seek back");
    }

    #[test]
    fn determine_binary_mode_false_for_printable_text() {
        let mut s = BufferStream::new();
        s.write(b"hello world\n");
        s.seek(0);
        assert!(!s.determine_binary_mode(12));
    }

    #[test]
    fn md5_of_stream_matches_direct_digest() {
        let mut s = BufferStream::new();
        s.write(b"The quick brown fox jumps over the lazy dog");
        s.header_mut().binary = true;
        s.seek(0);
        let digest = s.md5();
        assert_eq!(
            crate::digest::md5::to_hex(&digest),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn md5_text_mode_filters_cr() {
        let mut a = BufferStream::new();
        a.write(b"line1\r\nline2\r\n");
        a.header_mut().binary = false;
        a.seek(0);

        let mut b = BufferStream::new();
        b.write(b"line1\nline2\n");
        b.header_mut().binary = false;
        b.seek(0);

        assert_eq!(a.md5(), b.md5(), "text mode must filter CR for cross-platform parity");
    }

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "foundation-core-stream-test-{}-{name}",
            std::process::id()
        ))
    }

    #[test]
    fn file_stream_write_then_read_round_trips() {
        let path = scratch_path("round-trip");
        {
            let mut s = FileStream::open(&path, StreamMode::ReadWrite).unwrap();
            s.write_u32(0xCAFE_BABE);
        }
        let mut s = FileStream::open(&path, StreamMode::ReadOnly).unwrap();
        assert_eq!(s.read_u32(), Some(0xCAFE_BABE));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn file_stream_truncate_changes_size() {
        let path = scratch_path("truncate");
        let mut s = FileStream::open(&path, StreamMode::ReadWrite).unwrap();
        s.write(b"hello world");
        s.truncate(5);
        assert_eq!(s.size(), 5);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stream_open_resolves_file_scheme() {
        let path = scratch_path("open");
        std::fs::write(&path, b"payload").unwrap();
        let url = format!("file://{}", path.display());
        let mut opened = stream_open(&url, StreamMode::ReadOnly).expect("file:// must resolve");
        let mut buf = [0u8; 7];
        assert_eq!(opened.read(&mut buf), 7);
        assert_eq!(&buf, b"payload");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stream_open_rejects_unresolvable_schemes() {
        assert!(stream_open("buffer://0x1000", StreamMode::ReadOnly).is_none());
        assert!(stream_open("ringbuffer://0x2000", StreamMode::ReadOnly).is_none());
        assert!(stream_open("asset://icons/foo.png", StreamMode::ReadOnly).is_none());
        assert!(stream_open("not-a-url", StreamMode::ReadOnly).is_none());
    }
}
