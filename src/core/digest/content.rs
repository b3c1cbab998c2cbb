//! Raw-content digests of pixel buffers.

use crate::core::buffer::PixelBuffer;
use std::fmt;

/// BLAKE3 digest of a buffer's layout and bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        super::to_hex(&self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Digest a buffer's exact bytes.
///
/// The dimensions and channel count are hashed ahead of the payload, so
/// the same bytes reshaped to a different layout get a different digest.
/// Visually identical images stored with different channel layouts also
/// differ; this is content addressing, not similarity.
pub fn content_digest(buffer: &PixelBuffer) -> ContentDigest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&buffer.width().to_le_bytes());
    hasher.update(&buffer.height().to_le_bytes());
    hasher.update(&[buffer.channels()]);
    hasher.update(buffer.as_bytes());
    ContentDigest(*hasher.finalize().as_bytes())
}
