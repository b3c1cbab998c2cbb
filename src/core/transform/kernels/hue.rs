//! Random hue rotation. Non-deterministic, so it is never cached.

use super::{repackage, single};
use crate::core::buffer::PixelBuffer;
use crate::core::transform::{Params, Transform};
use crate::error::KernelError;
use rand::Rng;

const NAME: &str = "random_hue_shift";

/// Rotate the hue of every pixel by `degrees`, keeping alpha.
/// Gray buffers have no hue and come back unchanged.
pub fn shift_hue(image: &PixelBuffer, degrees: i32) -> Result<PixelBuffer, KernelError> {
    if image.channels() == 1 {
        return Ok(image.clone());
    }
    repackage(NAME, image.to_dynamic().huerotate(degrees))
}

/// Shifts hue by a random angle on every call
pub struct RandomHueShift;

impl Transform for RandomHueShift {
    fn name(&self) -> &str {
        NAME
    }

    fn is_deterministic(&self) -> bool {
        false
    }

    fn apply(&self, inputs: &[&PixelBuffer], _params: &Params) -> Result<PixelBuffer, KernelError> {
        let image = single(NAME, inputs)?;
        let degrees = rand::rng().random_range(0..360);
        shift_hue(image, degrees)
    }
}
