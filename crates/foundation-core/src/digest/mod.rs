//! MD5 and SHA-256 digests, exposed with a matching incremental API so
//! callers (and the stream abstraction's `md5()` helper) can treat them
//! uniformly.

pub mod md5;
pub mod sha256;

pub use md5::{md5, Md5};
pub use sha256::{sha256, Sha256};
