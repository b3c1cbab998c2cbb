//! # Buffer Module
//!
//! Owned, immutable pixel data that flows between pipeline steps.
//!
//! A [`PixelBuffer`] is row-major, tightly packed, with 1 (gray), 3 (RGB)
//! or 4 (RGBA) channels. Transforms never mutate a buffer they receive;
//! each step produces a new owned buffer.

mod load;
mod tiles;

pub use load::{load_image, ImageSource};
pub use tiles::{Tile, Tiles};

use crate::error::LoadError;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, Rgba};

/// Row-major pixel payload with its dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw bytes, checking that they match the declared layout
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, LoadError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(LoadError::UnsupportedChannels { channels });
        }

        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(LoadError::LayoutMismatch {
                width,
                height,
                channels,
                actual: data.len(),
            });
        }

        if expected == 0 {
            return Err(LoadError::EmptyImage {
                source_label: format!("{}x{} buffer", width, height),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build a buffer by evaluating `f` for every pixel
    ///
    /// `f` writes one pixel's channels into the provided slice.
    pub fn from_fn(
        width: u32,
        height: u32,
        channels: u8,
        mut f: impl FnMut(u32, u32, &mut [u8]),
    ) -> Result<Self, LoadError> {
        let mut data = vec![0u8; width as usize * height as usize * channels as usize];
        let stride = channels as usize;
        for (i, pixel) in data.chunks_exact_mut(stride.max(1)).enumerate() {
            let x = (i % width.max(1) as usize) as u32;
            let y = (i / width.max(1) as usize) as u32;
            f(x, y, pixel);
        }
        Self::new(width, height, channels, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Raw bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Channels of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let stride = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * stride;
        &self.data[start..start + stride]
    }

    /// Convert a decoded image, keeping gray and RGB(A) layouts as-is
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, LoadError> {
        let (width, height) = (image.width(), image.height());
        let (channels, data) = match image {
            DynamicImage::ImageLuma8(buffer) => (1, buffer.into_raw()),
            DynamicImage::ImageRgb8(buffer) => (3, buffer.into_raw()),
            DynamicImage::ImageRgba8(buffer) => (4, buffer.into_raw()),
            other if other.color().has_alpha() => (4, other.to_rgba8().into_raw()),
            other => (3, other.to_rgb8().into_raw()),
        };
        Self::new(width, height, channels, data)
    }

    /// View as an `image` crate type for kernels that need one
    pub fn to_dynamic(&self) -> DynamicImage {
        let (w, h, data) = (self.width, self.height, self.data.clone());
        // Layout was validated on construction, so from_raw cannot fail here.
        match self.channels {
            1 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, data)
                .map(DynamicImage::ImageLuma8),
            4 => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, data)
                .map(DynamicImage::ImageRgba8),
            _ => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data)
                .map(DynamicImage::ImageRgb8),
        }
        .unwrap_or_else(|| DynamicImage::new_rgb8(w, h))
    }

    /// Luminance view, used by the edge detectors
    pub fn to_gray(&self) -> GrayImage {
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .unwrap_or_else(|| GrayImage::new(self.width, self.height)),
            _ => self.to_dynamic().to_luma8(),
        }
    }

    /// Expand a gray image to a 3-channel buffer
    pub fn from_gray_as_rgb(gray: &GrayImage) -> Result<Self, LoadError> {
        let data = gray.as_raw().iter().flat_map(|&v| [v, v, v]).collect();
        Self::new(gray.width(), gray.height(), 3, data)
    }

    /// Split into tiles of at most `tile_width` x `tile_height`, row-major
    ///
    /// Tiles on the right and bottom edges are clipped to the image.
    pub fn tiles(&self, tile_width: u32, tile_height: u32) -> Tiles<'_> {
        Tiles::new(self, tile_width, tile_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_length() {
        let result = PixelBuffer::new(2, 2, 3, vec![0; 11]);
        assert!(matches!(result, Err(LoadError::LayoutMismatch { actual: 11, .. })));
    }

    #[test]
    fn new_rejects_unsupported_channels() {
        let result = PixelBuffer::new(1, 1, 2, vec![0; 2]);
        assert!(matches!(result, Err(LoadError::UnsupportedChannels { channels: 2 })));
    }

    #[test]
    fn new_rejects_empty_image() {
        let result = PixelBuffer::new(0, 5, 3, Vec::new());
        assert!(matches!(result, Err(LoadError::EmptyImage { .. })));
    }

    #[test]
    fn from_fn_places_pixels_row_major() {
        let buffer = PixelBuffer::from_fn(3, 2, 1, |x, y, px| px[0] = (y * 10 + x) as u8).unwrap();
        assert_eq!(buffer.as_bytes(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(buffer.pixel(2, 1), &[12]);
    }

    #[test]
    fn dynamic_round_trip_keeps_layout() {
        let buffer = PixelBuffer::from_fn(4, 3, 4, |x, y, px| {
            px.copy_from_slice(&[x as u8, y as u8, 7, 255]);
        })
        .unwrap();

        let back = PixelBuffer::from_dynamic(buffer.to_dynamic()).unwrap();
        assert_eq!(back, buffer);
    }

    #[test]
    fn gray_expands_to_three_channels() {
        let gray = GrayImage::from_fn(2, 1, |x, _| Luma([x as u8 * 100]));
        let buffer = PixelBuffer::from_gray_as_rgb(&gray).unwrap();
        assert_eq!(buffer.channels(), 3);
        assert_eq!(buffer.as_bytes(), &[0, 0, 0, 100, 100, 100]);
    }
}
