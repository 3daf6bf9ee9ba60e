//! 64-bit string hash — a MurmurHash-2-family variant (two 64-bit state
//! words, 16-byte block mix, tail merge, avalanche finalize). Only `h1` is
//! returned; the algorithm still carries `h2` through every round because
//! dropping it early would change the avalanche of `h1` itself.

use std::collections::HashMap;
use std::sync::Mutex;

const HASH_SEED: u64 = 0xbaad_f00d;

#[inline]
fn rotl64(x: u64, bits: u32) -> u64 {
    x.rotate_left(bits)
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[inline]
#[allow(clippy::too_many_arguments)]
fn bmix64(h1: &mut u64, h2: &mut u64, mut k1: u64, mut k2: u64, c1: &mut u64, c2: &mut u64) {
    k1 = k1.wrapping_mul(*c1);
    k1 = rotl64(k1, 23);
    k1 = k1.wrapping_mul(*c2);
    *h1 ^= k1;
    *h1 = h1.wrapping_add(*h2);
    *h2 = rotl64(*h2, 41);
    k2 = k2.wrapping_mul(*c2);
    k2 = rotl64(k2, 23);
    k2 = k2.wrapping_mul(*c1);
    *h2 ^= k2;
    *h2 = h2.wrapping_add(*h1);
    *h1 = h1.wrapping_mul(3).wrapping_add(0x52dc_e729);
    *h2 = h2.wrapping_mul(3).wrapping_add(0x3849_5ab5);
    *c1 = c1.wrapping_mul(5).wrapping_add(0x7b7d_159c);
    *c2 = c2.wrapping_mul(5).wrapping_add(0x6bce_6396);
}

/// Hash an arbitrary byte slice. Pure and deterministic: equal inputs
/// produce equal outputs across runs and platforms.
#[must_use]
pub fn hash(key: &[u8]) -> u64 {
    let len = key.len();
    let nblocks = len / 16;

    let mut h1 = 0x9368_e53c_2f6a_f274u64 ^ HASH_SEED;
    let mut h2 = 0x586d_cd20_8f7c_d3fdu64 ^ HASH_SEED;
    let mut c1 = 0x87c3_7b91_1142_53d5u64;
    let mut c2 = 0x4cf5_ad43_2745_937fu64;

    for i in 0..nblocks {
        let base = i * 16;
        let k1 = u64::from_le_bytes(key[base..base + 8].try_into().unwrap());
        let k2 = u64::from_le_bytes(key[base + 8..base + 16].try_into().unwrap());
        bmix64(&mut h1, &mut h2, k1, k2, &mut c1, &mut c2);
    }

    let tail = &key[nblocks * 16..];
    let mut k1 = 0u64;
    let mut k2 = 0u64;
    let tail_len = len & 15;

    if tail_len >= 9 {
        for i in (9..=tail_len.min(15)).rev() {
            k2 ^= (tail[i - 1] as u64) << (8 * (i - 9));
        }
    }
    if tail_len >= 1 {
        for i in (1..=tail_len.min(8)).rev() {
            k1 ^= (tail[i - 1] as u64) << (8 * (i - 1));
        }
        bmix64(&mut h1, &mut h2, k1, k2, &mut c1, &mut c2);
    }

    h2 ^= len as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1.wrapping_add(h2)
}

/// Convenience overload over `&str`.
#[must_use]
pub fn hash_str(s: &str) -> u64 {
    hash(s.as_bytes())
}

static STATIC_HASH_REGISTRY: Mutex<Option<HashMap<u64, String>>> = Mutex::new(None);

/// Feature-gated debugging aid: remember `hash -> original string` and
/// panic naming both strings if a new string collides with a recorded one.
/// Mirrors the original's `FOUNDATION_ASSERT_MSG` on static hash collision.
#[cfg(feature = "hash-debug")]
pub fn hash_debug_register(s: &str) -> u64 {
    let value = hash_str(s);
    let mut registry = STATIC_HASH_REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    let map = registry.get_or_insert_with(HashMap::new);
    match map.get(&value) {
        Some(existing) if existing != s => {
            panic!("static hash collision: {existing:?} and {s:?} both hash to {value:#x}");
        }
        _ => {
            map.insert(value, s.to_string());
        }
    }
    value
}

#[cfg(not(feature = "hash-debug"))]
pub fn hash_debug_register(s: &str) -> u64 {
    hash_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_hash_is_deterministic_well_known_value() {
        let a = hash_str("");
        let b = hash_str("");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_deterministic_across_calls() {
        assert_eq!(hash_str("hello world"), hash_str("hello world"));
        assert_ne!(hash_str("hello world"), hash_str("hello worle"));
    }

    #[test]
    fn hash_handles_all_tail_lengths() {
        for len in 0..40 {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let a = hash(&data);
            let b = hash(&data);
            assert_eq!(a, b, "len={len}");
        }
    }

    #[test]
    fn distinct_inputs_rarely_collide_small_sample() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for i in 0..10_000u32 {
            let s = format!("key-{i}");
            assert!(seen.insert(hash_str(&s)), "collision at {s}");
        }
    }
}
