//! UUID generation — v4 (random), v1 (time-based), v3 (name-based MD5).
//!
//! Serialized form is always lowercase `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`
//! (36 characters, dashes at 8/13/18/23). `parse(format(u)) == u` for every
//! value this module produces.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use rand::RngCore;

use crate::digest::md5;
use crate::time::system_time_100ns_intervals;

/// A 128-bit UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(pub [u8; 16]);

/// All-zero UUID, the designated "null" sentinel.
pub const NULL_UUID: Uuid = Uuid([0u8; 16]);

/// Predefined DNS namespace (`6ba7b810-9dad-11d1-80b4-00c04fd430c8`), the
/// canonical namespace for v3 name-based UUIDs over DNS names.
pub const UUID_DNS: Uuid = Uuid([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30, 0xc8,
]);

impl Uuid {
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// Lowercase `8-4-4-4-12` hex string.
    #[must_use]
    pub fn to_hyphenated(&self) -> String {
        let b = &self.0;
        format!(
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }

    /// Parse the canonical 36-character hyphenated form. Format-strict: no
    /// braces, no `urn:uuid:` prefix, dashes only at positions 8/13/18/23.
    pub fn parse(s: &str) -> Result<Uuid, ParseError> {
        let bytes = s.as_bytes();
        if bytes.len() != 36 {
            return Err(ParseError::WrongLength(bytes.len()));
        }
        for &pos in &[8usize, 13, 18, 23] {
            if bytes[pos] != b'-' {
                return Err(ParseError::MissingDash(pos));
            }
        }
        let mut out = [0u8; 16];
        let mut out_idx = 0;
        let mut i = 0;
        while i < 36 {
            if bytes[i] == b'-' {
                i += 1;
                continue;
            }
            let hi = hex_val(bytes[i]).ok_or(ParseError::InvalidHex(i))?;
            let lo = hex_val(bytes[i + 1]).ok_or(ParseError::InvalidHex(i + 1))?;
            out[out_idx] = (hi << 4) | lo;
            out_idx += 1;
            i += 2;
        }
        debug_assert_eq!(out_idx, 16);
        Ok(Uuid(out))
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("uuid string has wrong length {0} (expected 36)")]
    WrongLength(usize),
    #[error("missing dash at position {0}")]
    MissingDash(usize),
    #[error("invalid hex digit at position {0}")]
    InvalidHex(usize),
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hyphenated())
    }
}

/// v4: 122 random bits, variant/version bits overwritten.
#[must_use]
pub fn generate_v4() -> Uuid {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    set_variant_version(&mut bytes, 4);
    Uuid(bytes)
}

fn set_variant_version(bytes: &mut [u8; 16], version: u8) {
    bytes[6] = (bytes[6] & 0x0F) | (version << 4);
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
}

/// v3: MD5 of `namespace_bytes_big_endian ∥ name`. The namespace's first
/// three fields are swapped to network (big-endian) order before hashing,
/// and the result's matching bytes are swapped back, mirroring the
/// original's wire-order convention for namespace UUIDs.
#[must_use]
pub fn generate_v3(namespace: Uuid, name: &[u8]) -> Uuid {
    let mut ns_be = namespace.0;
    ns_be[0..4].reverse();
    ns_be[4..6].reverse();
    ns_be[6..8].reverse();

    let mut buf = Vec::with_capacity(16 + name.len());
    buf.extend_from_slice(&ns_be);
    buf.extend_from_slice(name);

    let mut digest = md5(&buf);
    digest[0..4].reverse();
    digest[4..6].reverse();
    digest[6..8].reverse();

    set_variant_version(&mut digest, 3);
    Uuid(digest)
}

const UUID_EPOCH_OFFSET_100NS: u64 = 0x01B2_1DD2_1381_4000;

static CLOCK_SEQUENCE: OnceLock<u16> = OnceLock::new();
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

fn clock_sequence() -> u16 {
    *CLOCK_SEQUENCE.get_or_init(|| (rand::thread_rng().next_u32() & 0x3FFF) as u16)
}

/// Random node id with the multicast bit set — used whenever no stable
/// per-machine id is available (the common case for a portable library with
/// no raw-syscall hardware-id lookup).
fn random_multicast_node() -> [u8; 6] {
    let mut node = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut node);
    node[0] |= 0x01;
    node
}

static NODE_ID: OnceLock<[u8; 6]> = OnceLock::new();

fn node_id() -> [u8; 6] {
    *NODE_ID.get_or_init(random_multicast_node)
}

/// v1: 60-bit 100ns-interval count since the UUID epoch (1582-10-15),
/// combined with a 14-bit clock sequence and a 48-bit node id. A CAS loop on
/// a single shared counter guarantees every call across every thread in the
/// process observes a strictly greater tick than the last, which is what
/// actually gives v1 UUIDs their uniqueness guarantee — a plain
/// load-then-store pair here would let two racing threads both observe the
/// same wall-clock tick and emit bit-for-bit identical UUIDs, since the
/// clock sequence and node id are fixed per process.
#[must_use]
pub fn generate_v1() -> Uuid {
    let wall = system_time_100ns_intervals().wrapping_add(UUID_EPOCH_OFFSET_100NS);

    let timestamp = loop {
        let last = LAST_TIMESTAMP.load(Ordering::Acquire);
        let candidate = wall.max(last.wrapping_add(1));
        if LAST_TIMESTAMP
            .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            break candidate;
        }
    };

    let time_low = (timestamp & 0xFFFF_FFFF) as u32;
    let time_mid = ((timestamp >> 32) & 0xFFFF) as u16;
    let time_hi = ((timestamp >> 48) & 0x0FFF) as u16;

    let clock_seq = clock_sequence();
    let node = node_id();

    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&time_low.to_be_bytes());
    bytes[4..6].copy_from_slice(&time_mid.to_be_bytes());
    bytes[6..8].copy_from_slice(&time_hi.to_be_bytes());
    bytes[8] = ((clock_seq >> 8) as u8) & 0x3F;
    bytes[9] = (clock_seq & 0xFF) as u8;
    bytes[10..16].copy_from_slice(&node);

    set_variant_version(&mut bytes, 1);
    // set_variant_version overwrites byte 8's top bits with the variant,
    // which already coexists with the clock-sequence's masked top bits.
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Uuid(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn format_parse_round_trip_v4() {
        for _ in 0..100 {
            let u = generate_v4();
            let s = u.to_hyphenated();
            assert_eq!(s.len(), 36);
            assert_eq!(Uuid::parse(&s).unwrap(), u);
        }
    }

    #[test]
    fn string_form_has_dashes_at_expected_positions() {
        let u = generate_v4();
        let s = u.to_hyphenated();
        for pos in [8, 13, 18, 23] {
            assert_eq!(s.as_bytes()[pos], b'-');
        }
    }

    #[test]
    fn null_uuid_is_all_zero_and_parses() {
        assert!(NULL_UUID.is_null());
        assert_eq!(Uuid::parse("00000000-0000-0000-0000-000000000000").unwrap(), NULL_UUID);
    }

    #[test]
    fn v3_known_answer() {
        let u = generate_v3(UUID_DNS, b"com.rampantpixels.foundation.uuidgen");
        assert_eq!(
            u.to_hyphenated(),
            "bd63fb1e-2eea-35eb-940f-1042e6008a95"
        );
    }

    #[test]
    fn v3_is_deterministic() {
        let a = generate_v3(UUID_DNS, b"example.com");
        let b = generate_v3(UUID_DNS, b"example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn v1_uniqueness_across_threads() {
        let mut handles = Vec::new();
        for _ in 0..32 {
            handles.push(thread::spawn(|| {
                let mut v = Vec::with_capacity(256);
                for _ in 0..256 {
                    v.push(generate_v1());
                }
                v
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for u in h.join().unwrap() {
                assert!(seen.insert(u), "duplicate v1 uuid generated");
            }
        }
        assert_eq!(seen.len(), 32 * 256);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(Uuid::parse("short").is_err());
    }

    #[test]
    fn parse_rejects_misplaced_dash() {
        assert!(Uuid::parse("00000000-0000-0000-00000-00000000000").is_err());
    }

    #[test]
    fn equal_uuids_are_bytewise_equal() {
        let a = Arc::new(UUID_DNS);
        let b = UUID_DNS;
        assert_eq!(**a, b);
        assert_ne!(*a, NULL_UUID);
    }
}
