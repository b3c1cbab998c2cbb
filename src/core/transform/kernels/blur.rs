//! Gaussian blur with an explicit, odd kernel size.

use super::{repackage, single};
use crate::core::buffer::PixelBuffer;
use crate::core::transform::{ParamSpec, ParamValue, Params, Transform};
use crate::error::{ConfigError, KernelError};
use image::buffer::ConvertBuffer;
use image::{DynamicImage, GrayImage};
use imageproc::filter::separable_filter_equal;

const NAME: &str = "gaussian_blur";
const DEFAULT_KERNEL_SIZE: i64 = 5;
const MAX_KERNEL_SIZE: i64 = 99;

/// Normalised 1D Gaussian weights.
///
/// A `sigma` of zero derives one from the kernel size using the usual
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8` rule.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let radius = (size / 2) as f64;

    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - radius;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / total) as f32).collect()
}

/// Gaussian smoothing of every colour channel
pub struct GaussianBlur;

impl Transform for GaussianBlur {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("kernel_size", ParamValue::Int(DEFAULT_KERNEL_SIZE)),
            ParamSpec::new("sigma", ParamValue::Float(0.0)),
        ]
    }

    fn validate(&self, params: &Params) -> Result<(), ConfigError> {
        let size = params.int("kernel_size").unwrap_or(DEFAULT_KERNEL_SIZE);
        if size <= 0 || size % 2 == 0 || size > MAX_KERNEL_SIZE {
            return Err(ConfigError::InvalidParameter {
                transform: NAME.to_string(),
                parameter: "kernel_size".to_string(),
                reason: format!("{} must be odd, positive and at most {}", size, MAX_KERNEL_SIZE),
            });
        }

        let sigma = params.float("sigma").unwrap_or(0.0);
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(ConfigError::InvalidParameter {
                transform: NAME.to_string(),
                parameter: "sigma".to_string(),
                reason: format!("{} must be zero (derived) or positive", sigma),
            });
        }
        Ok(())
    }

    fn apply(&self, inputs: &[&PixelBuffer], params: &Params) -> Result<PixelBuffer, KernelError> {
        let image = single(NAME, inputs)?;
        let size = params.int("kernel_size").unwrap_or(DEFAULT_KERNEL_SIZE) as usize;
        let sigma = params.float("sigma").unwrap_or(0.0);

        let kernel = gaussian_kernel(size, sigma);
        // Filter in float so rounding back to 8 bits happens once.
        let dynamic = image.to_dynamic();
        let blurred = match image.channels() {
            1 => {
                let gray: GrayImage = separable_filter_equal(&dynamic.to_luma32f(), &kernel).convert();
                DynamicImage::ImageLuma8(gray)
            }
            4 => DynamicImage::ImageRgba32F(separable_filter_equal(&dynamic.to_rgba32f(), &kernel)),
            _ => DynamicImage::ImageRgb32F(separable_filter_equal(&dynamic.to_rgb32f(), &kernel)),
        };
        repackage(NAME, blurred)
    }
}
