//! Photometric filter chain run before vessel segmentation.
//!
//! Stages run in a fixed order, each one consuming the previous output:
//! CLAHE on LAB lightness, green boost, contrast/brightness, gamma, optional
//! denoising, optional luma equalization, optional inversion, sharpening.

use image::{Rgb, RgbImage};
use imageproc::filter::filter3x3;
use tracing::{debug, warn};

use super::denoise::non_local_means;
use super::histogram::{clahe_lightness, equalize_luma};
use super::{saturate_u8, scale_abs};
use crate::error::AnalysisResult;
use crate::settings::VesselSettings;

const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Runs the chain. On any failure the input is returned unchanged.
pub fn enhance(image: &RgbImage, settings: &VesselSettings) -> RgbImage {
    match try_enhance(image, settings) {
        Ok(enhanced) => enhanced,
        Err(e) => {
            warn!("image enhancement failed, using the original image: {e}");
            image.clone()
        }
    }
}

/// Runs the chain and reports the first failing stage.
pub fn try_enhance(image: &RgbImage, settings: &VesselSettings) -> AnalysisResult<RgbImage> {
    settings.validate()?;
    if image.width() == 0 || image.height() == 0 {
        return Ok(image.clone());
    }

    let mut enhanced = clahe_lightness(image, settings.clahe_clip);
    boost_green(&mut enhanced, settings.green_boost);
    adjust_contrast_brightness(&mut enhanced, settings.contrast, settings.brightness);
    apply_gamma(&mut enhanced, settings.gamma);

    if settings.denoise_strength > 0 {
        enhanced = non_local_means(&enhanced, settings.denoise_strength as f32);
    }
    if settings.equalize_hist {
        enhanced = equalize_luma(&enhanced);
    }
    if settings.invert {
        invert(&mut enhanced);
    }
    let sharpened = sharpen(&enhanced);

    debug!(
        width = sharpened.width(),
        height = sharpened.height(),
        denoise = settings.denoise_strength,
        equalize = settings.equalize_hist,
        invert = settings.invert,
        "enhancement chain finished"
    );
    Ok(sharpened)
}

pub fn boost_green(image: &mut RgbImage, factor: f32) {
    for pixel in image.pixels_mut() {
        pixel[1] = scale_abs(pixel[1], factor, 0.0);
    }
}

/// `|v * contrast + 255 * (brightness - 1)|`, saturated.
pub fn adjust_contrast_brightness(image: &mut RgbImage, contrast: f32, brightness: f32) {
    let beta = 255.0 * (brightness - 1.0);
    for value in image.iter_mut() {
        *value = scale_abs(*value, contrast, beta);
    }
}

/// 256-entry table of `255 * (i / 255)^(1 / gamma)`, truncated.
pub fn gamma_table(gamma: f32) -> [u8; 256] {
    let inv_gamma = 1.0 / gamma as f64;
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = ((i as f64 / 255.0).powf(inv_gamma) * 255.0) as u8;
    }
    table
}

pub fn apply_gamma(image: &mut RgbImage, gamma: f32) {
    let table = gamma_table(gamma);
    for value in image.iter_mut() {
        *value = table[*value as usize];
    }
}

pub fn invert(image: &mut RgbImage) {
    for value in image.iter_mut() {
        *value = 255 - *value;
    }
}

pub fn sharpen(image: &RgbImage) -> RgbImage {
    let filtered = filter3x3::<Rgb<u8>, f32, f32>(image, &SHARPEN_KERNEL);
    let mut out = RgbImage::new(image.width(), image.height());
    for (dst, src) in out.iter_mut().zip(filtered.iter()) {
        *dst = saturate_u8(*src);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_gamma_is_identity() {
        let table = gamma_table(1.0);
        assert!(table.iter().enumerate().all(|(i, v)| *v as usize == i));
    }

    #[test]
    fn gamma_brightens_midtones() {
        let table = gamma_table(2.0);
        assert_eq!(table[0], 0);
        assert_eq!(table[255], 255);
        assert!(table[64] > 64);
    }

    #[test]
    fn sharpening_leaves_flat_regions_alone() {
        let flat = RgbImage::from_pixel(5, 5, Rgb([10, 20, 30]));
        assert_eq!(sharpen(&flat), flat);
    }
}
