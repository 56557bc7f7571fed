//! Vessel segmentation and enhancement settings.

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

const THRESHOLD: f32 = 0.3;
const COLOR_R: u8 = 255;
const COLOR_G: u8 = 0;
const COLOR_B: u8 = 0;
const OVERLAY_OPACITY: f32 = 0.35;
const POST_PROCESS: bool = true;
const USE_MODEL: bool = true;
const BRIGHTNESS: f32 = 1.2;
const CONTRAST: f32 = 1.5;
const GAMMA: f32 = 1.0;
const CLAHE_CLIP: f32 = 3.0;
const GREEN_BOOST: f32 = 1.3;
const DENOISE_STRENGTH: u8 = 5;
const INVERT: bool = false;
const EQUALIZE_HIST: bool = true;

pub const UNIT_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const BRIGHTNESS_RANGE: RangeInclusive<f32> = 0.5..=3.0;
pub const CONTRAST_RANGE: RangeInclusive<f32> = 0.5..=3.0;
pub const GAMMA_RANGE: RangeInclusive<f32> = 0.5..=2.0;
pub const CLAHE_CLIP_RANGE: RangeInclusive<f32> = 1.0..=5.0;
pub const GREEN_BOOST_RANGE: RangeInclusive<f32> = 0.5..=3.0;
pub const DENOISE_RANGE: RangeInclusive<u8> = 0..=20;

/// Options read by the enhancement chain and the vessel engine.
///
/// Loaded from JSON with every field optional; missing fields keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselSettings {
    /// Probability cut-off for the model mask, in `[0, 1]`.
    pub threshold: f32,
    pub color_r: u8,
    pub color_g: u8,
    pub color_b: u8,
    pub overlay_opacity: f32,
    pub post_process: bool,
    /// Prefer the segmentation network over the traditional pipeline.
    pub use_model: bool,
    pub brightness: f32,
    pub contrast: f32,
    pub gamma: f32,
    pub clahe_clip: f32,
    pub green_boost: f32,
    /// Non-local-means filter strength, 0 disables denoising.
    pub denoise_strength: u8,
    pub invert: bool,
    pub equalize_hist: bool,
}

impl Default for VesselSettings {
    fn default() -> Self {
        Self {
            threshold: THRESHOLD,
            color_r: COLOR_R,
            color_g: COLOR_G,
            color_b: COLOR_B,
            overlay_opacity: OVERLAY_OPACITY,
            post_process: POST_PROCESS,
            use_model: USE_MODEL,
            brightness: BRIGHTNESS,
            contrast: CONTRAST,
            gamma: GAMMA,
            clahe_clip: CLAHE_CLIP,
            green_boost: GREEN_BOOST,
            denoise_strength: DENOISE_STRENGTH,
            invert: INVERT,
            equalize_hist: EQUALIZE_HIST,
        }
    }
}

impl VesselSettings {
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn color(&self) -> [u8; 3] {
        [self.color_r, self.color_g, self.color_b]
    }

    /// Restores every default. `use_model` follows whether a vessel network is loaded.
    pub fn reset(&mut self, vessel_model_available: bool) {
        *self = Self {
            use_model: vessel_model_available,
            ..Self::default()
        };
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        check_in("threshold", self.threshold, &UNIT_RANGE)?;
        check_in("overlay_opacity", self.overlay_opacity, &UNIT_RANGE)?;
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("clahe_clip", self.clahe_clip),
            ("green_boost", self.green_boost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidSettings(format!("{name} must be a finite non-negative number, got {value}")));
            }
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(AnalysisError::InvalidSettings(format!("gamma must be positive, got {}", self.gamma)));
        }
        Ok(())
    }

    pub fn set_threshold(&mut self, value: f32) {
        self.threshold = clamp(value, &UNIT_RANGE);
    }

    pub fn set_overlay_opacity(&mut self, value: f32) {
        self.overlay_opacity = clamp(value, &UNIT_RANGE);
    }

    pub fn set_color(&mut self, [r, g, b]: [u8; 3]) {
        self.color_r = r;
        self.color_g = g;
        self.color_b = b;
    }

    pub fn set_brightness(&mut self, value: f32) {
        self.brightness = clamp(value, &BRIGHTNESS_RANGE);
    }

    pub fn set_contrast(&mut self, value: f32) {
        self.contrast = clamp(value, &CONTRAST_RANGE);
    }

    pub fn set_gamma(&mut self, value: f32) {
        self.gamma = clamp(value, &GAMMA_RANGE);
    }

    pub fn set_clahe_clip(&mut self, value: f32) {
        self.clahe_clip = clamp(value, &CLAHE_CLIP_RANGE);
    }

    pub fn set_green_boost(&mut self, value: f32) {
        self.green_boost = clamp(value, &GREEN_BOOST_RANGE);
    }

    pub fn set_denoise_strength(&mut self, value: u8) {
        self.denoise_strength = value.clamp(*DENOISE_RANGE.start(), *DENOISE_RANGE.end());
    }
}

fn clamp(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

fn check_in(name: &str, value: f32, range: &RangeInclusive<f32>) -> AnalysisResult<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(AnalysisError::InvalidSettings(format!(
            "{name} must lie in [{}, {}], got {value}",
            range.start(),
            range.end()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: VesselSettings =
            serde_json::from_str(r#"{"threshold": 0.5, "invert": true}"#).expect("valid json");
        assert_eq!(settings.threshold, 0.5);
        assert!(settings.invert);
        assert_eq!(settings.contrast, CONTRAST);
        assert_eq!(settings.color(), [255, 0, 0]);
    }

    #[test]
    fn setters_clamp_to_slider_ranges() {
        let mut settings = VesselSettings::default();
        settings.set_gamma(9.0);
        settings.set_threshold(-1.0);
        settings.set_denoise_strength(200);
        assert_eq!(settings.gamma, 2.0);
        assert_eq!(settings.threshold, 0.0);
        assert_eq!(settings.denoise_strength, 20);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validation_rejects_out_of_range_threshold() {
        let settings = VesselSettings {
            threshold: 1.5,
            ..VesselSettings::default()
        };
        assert!(matches!(settings.validate(), Err(AnalysisError::InvalidSettings(_))));
    }

    #[test]
    fn reset_follows_model_availability() {
        let mut settings = VesselSettings {
            brightness: 2.5,
            ..VesselSettings::default()
        };
        settings.reset(false);
        assert_eq!(settings.brightness, BRIGHTNESS);
        assert!(!settings.use_model);
    }
}
