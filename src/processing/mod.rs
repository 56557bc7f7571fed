//! Image-processing stages: enhancement, vessel segmentation, lesion sizing
//! and the rendered views built from them.

use image::{GrayImage, RgbImage};
use kornia::image::{Image, ImageSize, allocator::CpuAllocator};

use crate::error::AnalysisResult;

pub mod denoise;
pub mod enhance;
pub mod heatmap;
pub mod histogram;
pub mod lesions;
pub mod morphology;
pub mod render;
pub mod vessels;

pub(crate) type CpuImage<T, const C: usize> = Image<T, C, CpuAllocator>;

pub(crate) fn kornia_size(width: u32, height: u32) -> ImageSize {
    ImageSize {
        width: width as usize,
        height: height as usize,
    }
}

pub(crate) fn to_kornia_rgb(image: &RgbImage) -> AnalysisResult<CpuImage<u8, 3>> {
    let (width, height) = image.dimensions();
    Ok(CpuImage::<u8, 3>::new(
        kornia_size(width, height),
        image.as_raw().clone(),
        CpuAllocator,
    )?)
}

pub(crate) fn to_kornia_gray(image: &GrayImage) -> AnalysisResult<CpuImage<u8, 1>> {
    let (width, height) = image.dimensions();
    Ok(CpuImage::<u8, 1>::new(
        kornia_size(width, height),
        image.as_raw().clone(),
        CpuAllocator,
    )?)
}

pub(crate) fn from_kornia_gray(image: &CpuImage<u8, 1>) -> AnalysisResult<GrayImage> {
    let size = image.size();
    GrayImage::from_raw(size.width as u32, size.height as u32, image.as_slice().to_vec())
        .ok_or_else(|| crate::error::AnalysisError::computation("gray buffer does not match its size"))
}

/// Index into `0..len` mirroring out-of-range positions without repeating the edge.
pub(crate) fn reflect101(mut index: i64, len: i64) -> usize {
    if len <= 1 {
        return 0;
    }
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = 2 * len - 2 - index;
        } else {
            return index as usize;
        }
    }
}

/// Rounds to the nearest integer and saturates to `u8`.
pub(crate) fn saturate_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// `|src * alpha + beta|`, rounded and saturated.
pub(crate) fn scale_abs(value: u8, alpha: f32, beta: f32) -> u8 {
    saturate_u8((value as f32 * alpha + beta).abs())
}

/// Channel-wise blend `a * wa + b * wb`, rounded.
pub(crate) fn add_weighted(a: &RgbImage, wa: f32, b: &RgbImage, wb: f32) -> RgbImage {
    let mut out = a.clone();
    for (dst, src) in out.iter_mut().zip(b.iter()) {
        *dst = saturate_u8(*dst as f32 * wa + *src as f32 * wb);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect101_mirrors_without_edge() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(12, 5), 4);
        assert_eq!(reflect101(3, 1), 0);
    }

    #[test]
    fn scale_abs_folds_negative_values() {
        assert_eq!(scale_abs(0, 1.0, -127.5), 128);
        assert_eq!(scale_abs(200, 1.5, 0.0), 255);
    }
}
