//! # Digest Module
//!
//! Content addressing for the result cache.
//!
//! - [`content_digest`] hashes a buffer's exact bytes (not a perceptual hash)
//! - [`FingerprintBuilder`] derives a cache key from an operation's name,
//!   its canonicalised parameters and the digests of its inputs
//!
//! Both use BLAKE3, so collisions are treated as impossible.

mod content;
mod fingerprint;

pub use content::{content_digest, ContentDigest};
pub use fingerprint::{Fingerprint, FingerprintBuilder};

/// Lowercase hex encoding shared by digests and fingerprints
fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
