//! 3x3 sharpening.

use super::{repackage, single};
use crate::core::buffer::PixelBuffer;
use crate::core::transform::{Params, Transform};
use crate::error::KernelError;
use image::DynamicImage;
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;

const NAME: &str = "sharpen";

const KERNEL: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];

/// Boosts each pixel against its eight neighbours
pub struct Sharpen;

impl Transform for Sharpen {
    fn name(&self) -> &str {
        NAME
    }

    fn apply(&self, inputs: &[&PixelBuffer], _params: &Params) -> Result<PixelBuffer, KernelError> {
        let kernel = Kernel::new(&KERNEL, 3, 3);
        let sharpened = match single(NAME, inputs)?.to_dynamic() {
            DynamicImage::ImageLuma8(gray) => {
                DynamicImage::ImageLuma8(filter_clamped::<_, i32, u8>(&gray, kernel))
            }
            DynamicImage::ImageRgba8(rgba) => {
                DynamicImage::ImageRgba8(filter_clamped::<_, i32, u8>(&rgba, kernel))
            }
            other => DynamicImage::ImageRgb8(filter_clamped::<_, i32, u8>(&other.to_rgb8(), kernel)),
        };
        repackage(NAME, sharpened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_regions_are_unchanged() {
        let image = PixelBuffer::from_fn(4, 4, 3, |_, _, px| px.copy_from_slice(&[60, 120, 180])).unwrap();
        assert_eq!(Sharpen.apply(&[&image], &Params::new()).unwrap(), image);
    }

    #[test]
    fn isolated_bright_pixel_is_amplified() {
        let image = PixelBuffer::from_fn(3, 3, 1, |x, y, px| {
            px[0] = if (x, y) == (1, 1) { 20 } else { 10 };
        })
        .unwrap();

        let sharpened = Sharpen.apply(&[&image], &Params::new()).unwrap();

        // 9 * 20 - 8 * 10
        assert_eq!(sharpened.pixel(1, 1), &[100]);
        assert_eq!(image.pixel(1, 1), &[20], "input must not be modified");
    }

    #[test]
    fn results_clamp_to_byte_range() {
        let image = PixelBuffer::from_fn(3, 3, 3, |x, y, px| {
            let v = if (x, y) == (1, 1) { 250 } else { 5 };
            px.copy_from_slice(&[v, v, v]);
        })
        .unwrap();

        let sharpened = Sharpen.apply(&[&image], &Params::new()).unwrap();

        assert_eq!(sharpened.pixel(1, 1), &[255, 255, 255]);
        // Corner sees the bright centre once: 9 * 5 - 7 * 5 - 250
        assert_eq!(sharpened.pixel(0, 0), &[0, 0, 0]);
    }
}
