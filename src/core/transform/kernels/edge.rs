//! Edge detection: Sobel gradient magnitude and Canny.
//!
//! Both work on luminance and return a 3-channel image so that later
//! colour steps can run on the result.

use super::single;
use crate::core::buffer::PixelBuffer;
use crate::core::transform::{ParamSpec, ParamValue, Params, Transform};
use crate::error::{ConfigError, KernelError};
use image::{GrayImage, Luma};
use imageproc::gradients::sobel_gradients;

const SOBEL: &str = "sobel";
const CANNY: &str = "canny";

fn kernel_failed(operation: &str, reason: impl ToString) -> KernelError {
    KernelError::Failed {
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
}

/// Gradient magnitude scaled so the strongest edge is 255
pub struct Sobel;

impl Transform for Sobel {
    fn name(&self) -> &str {
        SOBEL
    }

    fn apply(&self, inputs: &[&PixelBuffer], _params: &Params) -> Result<PixelBuffer, KernelError> {
        let gray = single(SOBEL, inputs)?.to_gray();
        let magnitude = sobel_gradients(&gray);

        let peak = magnitude.pixels().map(|p| p.0[0]).max().unwrap_or(0);
        let scaled: Vec<u8> = magnitude
            .pixels()
            .map(|p| if peak > 0 { (p.0[0] as u32 * 255 / peak as u32) as u8 } else { 0 })
            .collect();

        let edges = GrayImage::from_raw(gray.width(), gray.height(), scaled)
            .ok_or_else(|| kernel_failed(SOBEL, "gradient buffer size mismatch"))?;
        PixelBuffer::from_gray_as_rgb(&edges).map_err(|e| kernel_failed(SOBEL, e))
    }
}

/// Canny edge detector with hysteresis thresholds
pub struct Canny;

impl Transform for Canny {
    fn name(&self) -> &str {
        CANNY
    }

    fn schema(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("low", ParamValue::Float(100.0)),
            ParamSpec::new("high", ParamValue::Float(200.0)),
        ]
    }

    fn validate(&self, params: &Params) -> Result<(), ConfigError> {
        let low = params.float("low").unwrap_or(100.0);
        let high = params.float("high").unwrap_or(200.0);
        let invalid = |parameter: &str, reason: String| ConfigError::InvalidParameter {
            transform: CANNY.to_string(),
            parameter: parameter.to_string(),
            reason,
        };

        if !low.is_finite() || low <= 0.0 {
            return Err(invalid("low", format!("{} must be positive", low)));
        }
        if !high.is_finite() || high < low {
            return Err(invalid("high", format!("{} must be at least low ({})", high, low)));
        }
        Ok(())
    }

    fn apply(&self, inputs: &[&PixelBuffer], params: &Params) -> Result<PixelBuffer, KernelError> {
        let gray = single(CANNY, inputs)?.to_gray();
        let low = params.float("low").unwrap_or(100.0) as f32;
        let high = params.float("high").unwrap_or(200.0) as f32;

        // imageproc's non-maximum suppression needs an interior pixel.
        let edges = if gray.width() < 3 || gray.height() < 3 {
            GrayImage::from_pixel(gray.width(), gray.height(), Luma([0]))
        } else {
            imageproc::edges::canny(&gray, low, high)
        };
        PixelBuffer::from_gray_as_rgb(&edges).map_err(|e| kernel_failed(CANNY, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20x20 image with a sharp vertical boundary at x = 10
    fn sharp_edge_image() -> PixelBuffer {
        PixelBuffer::from_fn(20, 20, 3, |x, _, px| {
            let v = if x < 10 { 0 } else { 255 };
            px.copy_from_slice(&[v, v, v]);
        })
        .unwrap()
    }

    fn canny_params(low: f64, high: f64) -> Params {
        Params::new()
            .with("low", ParamValue::Float(low))
            .with("high", ParamValue::Float(high))
    }

    #[test]
    fn sobel_marks_boundary_at_full_strength() {
        let edges = Sobel.apply(&[&sharp_edge_image()], &Params::new()).unwrap();
        assert_eq!(edges.channels(), 3);
        assert_eq!(edges.pixel(10, 10), &[255, 255, 255]);
        assert_eq!(edges.pixel(2, 10), &[0, 0, 0]);
    }

    #[test]
    fn sobel_on_flat_image_is_black() {
        let flat = PixelBuffer::from_fn(5, 5, 1, |_, _, px| px[0] = 90).unwrap();
        let edges = Sobel.apply(&[&flat], &Params::new()).unwrap();
        assert!(edges.as_bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn canny_finds_the_boundary() {
        let edges = Canny.apply(&[&sharp_edge_image()], &canny_params(50.0, 150.0)).unwrap();
        let edge_count = edges.as_bytes().chunks_exact(3).filter(|px| px[0] > 0).count();
        assert!(edge_count > 0, "expected edges along the boundary");
    }

    #[test]
    fn canny_on_uniform_image_has_no_edges() {
        let flat = PixelBuffer::from_fn(20, 20, 3, |_, _, px| px.copy_from_slice(&[128; 3])).unwrap();
        let edges = Canny.apply(&[&flat], &canny_params(50.0, 150.0)).unwrap();
        assert!(edges.as_bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn canny_rejects_inverted_thresholds() {
        assert!(Canny.validate(&canny_params(200.0, 100.0)).is_err());
        assert!(Canny.validate(&canny_params(0.0, 100.0)).is_err());
        assert!(Canny.validate(&canny_params(100.0, 200.0)).is_ok());
    }
}
