//! Vessel segmentation, density and vessel overlays.
//!
//! Two strategies produce a binary mask: a segmentation network fed the
//! enhanced image at 512x512, or a traditional pipeline thresholding the
//! enhanced green channel with Otsu's method. Both masks may then be cleaned
//! by [`post_process`].

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use kornia::image::allocator::CpuAllocator;
use kornia::imgproc;
use serde::Serialize;
use tracing::{debug, info};

use super::enhance::enhance;
use super::histogram::clahe;
use super::morphology::{close_then_open, post_process};
use super::{CpuImage, add_weighted, from_kornia_gray, kornia_size, to_kornia_gray};
use crate::detection::VesselNetwork;
use crate::error::{AnalysisError, AnalysisResult};
use crate::settings::VesselSettings;

pub const MODEL_INPUT_SIZE: u32 = 512;
pub const TRADITIONAL_CLAHE_CLIP: f32 = 3.0;
const MEDIAN_RADIUS: u32 = 2;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Network input: a 512x512 RGB image normalized with ImageNet statistics,
/// laid out channel-first.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    /// `3 * height * width` values, channel-major.
    pub data: Vec<f32>,
}

impl ModelInput {
    pub fn from_image(image: &RgbImage) -> Self {
        let resized = imageops::resize(image, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, FilterType::Triangle);
        let plane = (MODEL_INPUT_SIZE * MODEL_INPUT_SIZE) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + i] = (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
        Self {
            width: MODEL_INPUT_SIZE,
            height: MODEL_INPUT_SIZE,
            data,
        }
    }
}

/// Which strategy produced a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum VesselMethod {
    #[strum(serialize = "UNet (Trained Model)")]
    Model,
    #[strum(serialize = "Traditional")]
    Traditional,
}

impl VesselMethod {
    /// Label used on rendered images.
    pub fn short_label(&self) -> &'static str {
        match self {
            VesselMethod::Model => "UNet",
            VesselMethod::Traditional => "Traditional",
        }
    }
}

/// A binary vessel mask (0 or 255) at source resolution.
#[derive(Debug, Clone)]
pub struct VesselSegmentation {
    pub mask: GrayImage,
    /// Percentage of mask pixels that are vessel.
    pub density: f64,
    pub method: VesselMethod,
}

/// Segments vessels with the network when it is loaded and preferred, with
/// the traditional pipeline otherwise.
pub fn segment(
    image: &RgbImage,
    network: Option<&dyn VesselNetwork>,
    settings: &VesselSettings,
) -> AnalysisResult<VesselSegmentation> {
    let (mask, method) = match network {
        Some(network) if settings.use_model => (segment_with_model(image, network, settings)?, VesselMethod::Model),
        _ => (segment_traditional(image, settings)?, VesselMethod::Traditional),
    };
    let mask = if settings.post_process { post_process(&mask) } else { mask };
    let density = vessel_density(&mask);
    info!(%method, density, "vessel segmentation finished");

    Ok(VesselSegmentation { mask, density, method })
}

pub fn segment_with_model(
    image: &RgbImage,
    network: &dyn VesselNetwork,
    settings: &VesselSettings,
) -> AnalysisResult<GrayImage> {
    let (width, height) = image.dimensions();
    let enhanced = enhance(image, settings);
    let input = ModelInput::from_image(&enhanced);
    let logits = network.forward(&input)?;

    let expected = (MODEL_INPUT_SIZE * MODEL_INPUT_SIZE) as usize;
    if logits.len() != expected {
        return Err(AnalysisError::computation(format!(
            "vessel network returned {} values, expected {expected}",
            logits.len()
        )));
    }

    let probabilities: Vec<f32> = logits.into_iter().map(sigmoid).collect();
    let probability_map = CpuImage::<f32, 1>::new(
        kornia_size(MODEL_INPUT_SIZE, MODEL_INPUT_SIZE),
        probabilities,
        CpuAllocator,
    )?;
    let mut resized = CpuImage::<f32, 1>::from_size_val(kornia_size(width, height), 0.0, CpuAllocator)?;
    imgproc::resize::resize_native(
        &probability_map,
        &mut resized,
        imgproc::interpolation::InterpolationMode::Bilinear,
    )?;

    let mut binary = CpuImage::<f32, 1>::from_size_val(resized.size(), 0.0, CpuAllocator)?;
    imgproc::threshold::threshold_binary(&resized, &mut binary, settings.threshold, 255.0)?;

    let raw = binary.as_slice().iter().map(|v| *v as u8).collect();
    GrayImage::from_raw(width, height, raw).ok_or_else(|| AnalysisError::computation("probability map size mismatch"))
}

pub fn segment_traditional(image: &RgbImage, settings: &VesselSettings) -> AnalysisResult<GrayImage> {
    let enhanced = enhance(image, settings);
    let green = GrayImage::from_fn(enhanced.width(), enhanced.height(), |x, y| {
        Luma([enhanced.get_pixel(x, y)[1]])
    });
    let equalized = clahe(&green, TRADITIONAL_CLAHE_CLIP);
    let smoothed = median_filter(&equalized, MEDIAN_RADIUS, MEDIAN_RADIUS);
    let level = otsu_level(&smoothed);
    debug!(level, "otsu threshold for vessel mask");

    let source = to_kornia_gray(&smoothed)?;
    let mut binary = CpuImage::<u8, 1>::from_size_val(source.size(), 0u8, CpuAllocator)?;
    imgproc::threshold::threshold_binary(&source, &mut binary, level, 255)?;

    Ok(close_then_open(&from_kornia_gray(&binary)?))
}

/// `100 * nonzero / total`. An empty mask has density 0.
pub fn vessel_density(mask: &GrayImage) -> f64 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let vessel = mask.as_raw().iter().filter(|v| **v > 0).count();
    100.0 * vessel as f64 / total as f64
}

/// Mask pixels painted in `color` on black.
pub fn colorize(mask: &GrayImage, color: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] > 0 { Rgb(color) } else { Rgb([0, 0, 0]) }
    })
}

/// `original * (1 - opacity) + colorized * opacity` over the whole image.
pub fn overlay(original: &RgbImage, mask: &GrayImage, color: [u8; 3], opacity: f32) -> RgbImage {
    add_weighted(original, 1.0 - opacity, &colorize(mask, color), opacity)
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}
