//! Built-in filter kernels.
//!
//! The pixel work is delegated to `imageproc` and `image::imageops`.
//! Borders are padded by continuity.

mod blur;
mod edge;
mod hue;
mod sharpen;

pub use blur::{gaussian_kernel, GaussianBlur};
pub use edge::{Canny, Sobel};
pub use hue::{shift_hue, RandomHueShift};
pub use sharpen::Sharpen;

use crate::core::buffer::PixelBuffer;
use crate::error::KernelError;
use image::DynamicImage;

/// Take the single input of a unary transform
fn single<'a>(operation: &str, inputs: &[&'a PixelBuffer]) -> Result<&'a PixelBuffer, KernelError> {
    match inputs {
        [only] => Ok(*only),
        _ => Err(KernelError::Arity {
            operation: operation.to_string(),
            expected: 1,
            actual: inputs.len(),
        }),
    }
}

/// Package an `image` crate result as kernel output
fn repackage(operation: &str, image: DynamicImage) -> Result<PixelBuffer, KernelError> {
    PixelBuffer::from_dynamic(image).map_err(|e| KernelError::Failed {
        operation: operation.to_string(),
        reason: e.to_string(),
    })
}
