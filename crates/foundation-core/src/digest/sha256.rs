//! SHA-256 digest — incremental `new` / `update` / `finalize` / `hex()`,
//! built on the `sha2` crate already carried in this workspace's
//! dependency stack.

use sha2::{Digest as _, Sha256 as Sha2Sha256};

/// Incremental SHA-256 hasher.
#[derive(Default)]
pub struct Sha256(Sha2Sha256);

impl Sha256 {
    #[must_use]
    pub fn new() -> Self {
        Sha256(Sha2Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    #[must_use]
    pub fn finalize(self) -> [u8; 32] {
        self.0.finalize().into()
    }
}

/// One-shot SHA-256 of a byte slice.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize()
}

/// Lowercase hex encoding of a digest.
#[must_use]
pub fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
