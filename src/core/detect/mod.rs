//! # Detect Module
//!
//! Object detection as seen by the pipeline: an opaque, deterministic
//! operation that maps an image to an annotated copy plus bounding boxes.
//!
//! The pipeline only needs the detector's name and parameters to cache its
//! output; the model behind it is pluggable. [`SkinToneDetector`] is the
//! built-in default.

mod skin;

pub use skin::SkinToneDetector;

use crate::core::buffer::PixelBuffer;
use crate::core::transform::Params;
use crate::error::KernelError;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Output of a detector run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Copy of the input with findings drawn on it
    pub annotated: PixelBuffer,
    pub findings: Vec<BoundingBox>,
}

impl Detection {
    /// Whether anything was found
    pub fn faces_detected(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Trait for detector implementations
pub trait Detector: Send + Sync {
    /// Operation name used in fingerprints and failure reports
    fn name(&self) -> &str;

    /// Settings that change the output; part of the cache key
    fn parameters(&self) -> Params {
        Params::new()
    }

    /// Detect objects in `image`. Must be deterministic.
    fn detect(&self, image: &PixelBuffer) -> Result<Detection, KernelError>;
}
