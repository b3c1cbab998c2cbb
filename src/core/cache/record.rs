//! Binary framing for cached results.
//!
//! ```text
//! magic "PLX1" | kind u8 | width u32 | height u32 | channels u8
//!              | len u64 | pixels [len] | (detection only) count u32 | boxes [count * 4 * u32]
//! ```
//!
//! All integers are little-endian. Decoding is strict: any trailing or
//! missing byte makes the record unreadable, which callers treat as a miss.

use crate::core::buffer::PixelBuffer;
use crate::core::detect::{BoundingBox, Detection};

const MAGIC: &[u8; 4] = b"PLX1";
const KIND_IMAGE: u8 = 1;
const KIND_DETECTION: u8 = 2;

/// Frame a transform output
pub fn encode_buffer(buffer: &PixelBuffer) -> Vec<u8> {
    let mut out = header(KIND_IMAGE, buffer);
    write_pixels(&mut out, buffer);
    out
}

/// Restore a transform output, or `None` if the bytes are not a valid record
pub fn decode_buffer(bytes: &[u8]) -> Option<PixelBuffer> {
    let mut reader = Reader::new(bytes);
    reader.expect_header(KIND_IMAGE)?;
    let buffer = reader.pixels()?;
    reader.finish()?;
    Some(buffer)
}

/// Frame a detector output
pub fn encode_detection(detection: &Detection) -> Vec<u8> {
    let mut out = header(KIND_DETECTION, &detection.annotated);
    write_pixels(&mut out, &detection.annotated);
    out.extend_from_slice(&(detection.findings.len() as u32).to_le_bytes());
    for b in &detection.findings {
        for v in [b.x, b.y, b.width, b.height] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

/// Restore a detector output, or `None` if the bytes are not a valid record
pub fn decode_detection(bytes: &[u8]) -> Option<Detection> {
    let mut reader = Reader::new(bytes);
    reader.expect_header(KIND_DETECTION)?;
    let annotated = reader.pixels()?;

    let count = reader.u32()? as usize;
    // Each box is 16 bytes; reject counts the payload cannot hold.
    if count > reader.remaining() / 16 {
        return None;
    }
    let mut findings = Vec::with_capacity(count);
    for _ in 0..count {
        findings.push(BoundingBox {
            x: reader.u32()?,
            y: reader.u32()?,
            width: reader.u32()?,
            height: reader.u32()?,
        });
    }
    reader.finish()?;

    Some(Detection {
        annotated,
        findings,
    })
}

fn header(kind: u8, buffer: &PixelBuffer) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC.len() + 18 + buffer.as_bytes().len());
    out.extend_from_slice(MAGIC);
    out.push(kind);
    out
}

fn write_pixels(out: &mut Vec<u8>, buffer: &PixelBuffer) {
    out.extend_from_slice(&buffer.width().to_le_bytes());
    out.extend_from_slice(&buffer.height().to_le_bytes());
    out.push(buffer.channels());
    out.extend_from_slice(&(buffer.as_bytes().len() as u64).to_le_bytes());
    out.extend_from_slice(buffer.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < n {
            return None;
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Some(head)
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)?.try_into().ok().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)?.try_into().ok().map(u64::from_le_bytes)
    }

    fn expect_header(&mut self, kind: u8) -> Option<()> {
        (self.take(MAGIC.len())? == MAGIC && self.u8()? == kind).then_some(())
    }

    fn pixels(&mut self) -> Option<PixelBuffer> {
        let width = self.u32()?;
        let height = self.u32()?;
        let channels = self.u8()?;
        let len = usize::try_from(self.u64()?).ok()?;
        let data = self.take(len)?.to_vec();
        PixelBuffer::new(width, height, channels, data).ok()
    }

    fn finish(&self) -> Option<()> {
        self.bytes.is_empty().then_some(())
    }
}
