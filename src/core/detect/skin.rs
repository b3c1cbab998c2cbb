//! Skin-tone region detector.
//!
//! Marks pixels that pass a classic RGB skin-colour rule, groups them into
//! 8-connected regions and keeps regions whose size and shape are plausible
//! for a face. Each finding is outlined in blue on a copy of the input.

use super::{BoundingBox, Detection, Detector};
use crate::core::buffer::PixelBuffer;
use crate::core::transform::{ParamValue, Params};
use crate::error::KernelError;
use image::{GrayImage, Luma, Rgba};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

const NAME: &str = "face_detect";
const OUTLINE_THICKNESS: u32 = 2;
const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Default detector: connected skin-coloured regions
#[derive(Debug, Clone)]
pub struct SkinToneDetector {
    /// Smallest region, in pixels, reported as a finding
    pub min_pixels: u32,
}

impl SkinToneDetector {
    pub fn new() -> Self {
        Self { min_pixels: 64 }
    }

    fn is_skin(r: u8, g: u8, b: u8) -> bool {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        r > 95 && g > 40 && b > 20 && max - min > 15 && r.abs_diff(g) > 15 && r > g && r > b
    }

    fn skin_mask(image: &PixelBuffer) -> GrayImage {
        if image.channels() == 1 {
            return GrayImage::new(image.width(), image.height());
        }
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let px = image.pixel(x, y);
            Luma([if Self::is_skin(px[0], px[1], px[2]) { 255 } else { 0 }])
        })
    }

    fn regions(&self, mask: &GrayImage) -> Vec<BoundingBox> {
        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        // label -> (min_x, min_y, max_x, max_y, pixel_count)
        let mut extents: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0];
            if label == 0 {
                continue;
            }
            let entry = extents.entry(label).or_insert((x, y, x, y, 0));
            entry.0 = entry.0.min(x);
            entry.1 = entry.1.min(y);
            entry.2 = entry.2.max(x);
            entry.3 = entry.3.max(y);
            entry.4 += 1;
        }

        let mut findings: Vec<BoundingBox> = extents
            .into_values()
            .filter(|&(_, _, _, _, count)| count >= self.min_pixels)
            .map(|(x0, y0, x1, y1, count)| {
                let region = BoundingBox {
                    x: x0,
                    y: y0,
                    width: x1 - x0 + 1,
                    height: y1 - y0 + 1,
                };
                (region, count)
            })
            .filter(|(region, count)| {
                let aspect = region.width as f64 / region.height as f64;
                let fill = *count as f64 / region.area() as f64;
                (0.4..=2.5).contains(&aspect) && fill >= 0.3
            })
            .map(|(region, _)| region)
            .collect();

        // Label numbering is an implementation detail; report in reading order.
        findings.sort_by_key(|b| (b.y, b.x));
        findings
    }

    fn annotate(image: &PixelBuffer, findings: &[BoundingBox]) -> Result<PixelBuffer, KernelError> {
        let mut canvas = image.to_dynamic();

        // Thicker outlines are nested rectangles growing inward.
        for region in findings {
            for inset in 0..OUTLINE_THICKNESS {
                if region.width <= 2 * inset || region.height <= 2 * inset {
                    break;
                }
                let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32)
                    .of_size(region.width - 2 * inset, region.height - 2 * inset);
                draw_hollow_rect_mut(&mut canvas, rect, OUTLINE_COLOR);
            }
        }

        PixelBuffer::from_dynamic(canvas).map_err(|e| KernelError::Failed {
            operation: NAME.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for SkinToneDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for SkinToneDetector {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> Params {
        Params::new().with("min_pixels", ParamValue::Int(self.min_pixels as i64))
    }

    fn detect(&self, image: &PixelBuffer) -> Result<Detection, KernelError> {
        let findings = self.regions(&Self::skin_mask(image));
        let annotated = Self::annotate(image, &findings)?;
        Ok(Detection {
            annotated,
            findings,
        })
    }
}
