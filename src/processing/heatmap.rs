//! Lesion density heatmap.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::filter::gaussian_blur_f32;

use super::{add_weighted, saturate_u8};
use crate::detection::DetectionBox;

/// Sigma of a 51x51 Gaussian kernel with automatic sigma, `0.3 * ((51 - 1) / 2 - 1) + 0.8`.
pub const HEATMAP_SIGMA: f32 = 8.0;
pub const DISPLAY_WEIGHT: f32 = 0.7;
pub const HEATMAP_WEIGHT: f32 = 0.3;

/// Intensity map (0..=255) of lesion locations: a filled disc per lesion,
/// blurred and min-max normalized. All zero when there are no lesions.
pub fn lesion_heat(width: u32, height: u32, lesions: &[DetectionBox]) -> GrayImage {
    let mut heat: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::new(width, height);
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }
    for lesion in lesions {
        let b = &lesion.bounding_box;
        let radius = (b.width().div_euclid(2)).max(b.height().div_euclid(2)) * 2;
        draw_filled_circle_mut(&mut heat, b.center(), radius, Luma([255.0]));
    }
    let blurred = gaussian_blur_f32(&heat, HEATMAP_SIGMA);

    let (min, max) = blurred
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let range = max - min;
    GrayImage::from_fn(width, height, |x, y| {
        if range <= 0.0 {
            return Luma([0]);
        }
        Luma([saturate_u8((blurred.get_pixel(x, y)[0] - min) * 255.0 / range)])
    })
}

/// Heat painted into the red channel.
pub fn colorize_heat(heat: &GrayImage) -> RgbImage {
    RgbImage::from_fn(heat.width(), heat.height(), |x, y| Rgb([heat.get_pixel(x, y)[0], 0, 0]))
}

/// `display * 0.7 + heat * 0.3`.
pub fn blend_heatmap(display: &RgbImage, heat: &RgbImage) -> RgbImage {
    add_weighted(display, DISPLAY_WEIGHT, heat, HEATMAP_WEIGHT)
}
