//! Pixel geometry and the pixel-to-micrometer unit converter.
//!
//! Distances on the retina are expressed either in pixels, in optic-disc
//! diameters (DD) or in micrometers. The conversions below are the only place
//! where those units meet.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Micrometers spanned by one optic-disc diameter.
pub const DD_TO_MICROMETERS: f64 = 1500.0;

/// Micrometers assumed across the full image width when no disc was found.
pub const FALLBACK_FIELD_WIDTH_MICROMETERS: f64 = 15000.0;

/// Calibration used when the fallback heuristic yields a non-positive value.
pub const DEFAULT_PIXELS_PER_MICROMETER: f64 = 0.1;

/// Factor converting the disc bounding-box extent to the anatomical disc diameter.
///
/// This is a fixed calibration assumption carried over unchanged; it has not
/// been clinically validated.
pub const DISC_BOX_TO_DIAMETER: f64 = 1.5;

/// Integer pixel coordinate `(x, y)`.
pub type PixelPoint = (i32, i32);

/// Axis-aligned box in pixel coordinates, `x1 < x2` and `y1 < y2`.
///
/// Serialized as `[x1, y1, x2, y2]`, the layout detectors emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Integer midpoint using floor division, `((x1+x2)//2, (y1+y2)//2)`.
    pub fn center(&self) -> PixelPoint {
        ((self.x1 + self.x2).div_euclid(2), (self.y1 + self.y2).div_euclid(2))
    }

    /// Expands the box by `padding` on every side and clamps it to a
    /// `width` x `height` image. Returns `None` when nothing is left.
    pub fn padded_within(&self, padding: i32, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = (self.x1 - padding).max(0);
        let y1 = (self.y1 - padding).max(0);
        let x2 = (self.x2 + padding).min(width as i32);
        let y2 = (self.y2 + padding).min(height as i32);
        (x2 > x1 && y2 > y1).then_some(BoundingBox { x1, y1, x2, y2 })
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Euclidean distance between two pixel coordinates.
pub fn distance(a: PixelPoint, b: PixelPoint) -> f64 {
    let dx = (a.0 - b.0) as f64;
    let dy = (a.1 - b.1) as f64;
    dx.hypot(dy)
}

/// Distance expressed in optic-disc diameters. `None` when the disc diameter is zero.
pub fn distance_in_dd(distance_px: f64, disc_diameter_px: f64) -> Option<f64> {
    (disc_diameter_px != 0.0).then(|| distance_px / disc_diameter_px)
}

/// True when the distance falls inside the 1 DD circle, whose radius is half a disc diameter.
pub fn within_one_dd(distance_px: f64, disc_diameter_px: f64) -> bool {
    distance_px <= disc_diameter_px / 2.0
}

/// Anatomical disc diameter in pixels derived from the disc bounding box.
pub fn disc_diameter_from_box(disc: &BoundingBox) -> u32 {
    let extent = disc.width().max(disc.height()).max(0) as f64;
    (extent * DISC_BOX_TO_DIAMETER).round() as u32
}

/// Distance of one lesion center to the macula center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LesionDistance {
    pub center: PixelPoint,
    pub distance_px: f64,
    pub distance_dd: f64,
    pub within_one_dd: bool,
}

impl LesionDistance {
    /// Measures `lesion` against `macula_center`. `None` when the disc diameter is zero.
    pub fn measure(lesion: &BoundingBox, macula_center: PixelPoint, disc_diameter_px: u32) -> Option<Self> {
        let dd = disc_diameter_px as f64;
        let center = lesion.center();
        let distance_px = distance(center, macula_center);
        let distance_dd = distance_in_dd(distance_px, dd)?;
        Some(Self {
            center,
            distance_px,
            distance_dd,
            within_one_dd: within_one_dd(distance_px, dd),
        })
    }
}

/// Pixels-per-micrometer scale factor. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pixels_per_micrometer: f64,
}

impl Calibration {
    pub fn new(pixels_per_micrometer: f64) -> Result<Self, AnalysisError> {
        if pixels_per_micrometer.is_finite() && pixels_per_micrometer > 0.0 {
            Ok(Self { pixels_per_micrometer })
        } else {
            Err(AnalysisError::CalibrationUndefined)
        }
    }

    /// Calibration from a detected optic disc, `diameter_px / 1500`.
    pub fn from_disc_diameter(disc_diameter_px: u32) -> Result<Self, AnalysisError> {
        Self::new(disc_diameter_px as f64 / DD_TO_MICROMETERS)
    }

    /// Heuristic calibration from the image width, `width / 15000`, falling
    /// back to [`DEFAULT_PIXELS_PER_MICROMETER`] when that is not positive.
    pub fn from_image_width(image_width: u32) -> Self {
        Self::new(image_width as f64 / FALLBACK_FIELD_WIDTH_MICROMETERS).unwrap_or(Self {
            pixels_per_micrometer: DEFAULT_PIXELS_PER_MICROMETER,
        })
    }

    /// Disc-based calibration when a disc was measured, the width heuristic otherwise.
    pub fn resolve(disc_diameter_px: u32, image_width: u32) -> Self {
        Self::from_disc_diameter(disc_diameter_px).unwrap_or_else(|_| Self::from_image_width(image_width))
    }

    pub fn pixels_per_micrometer(&self) -> f64 {
        self.pixels_per_micrometer
    }

    pub fn to_micrometers(&self, length_px: f64) -> f64 {
        length_px / self.pixels_per_micrometer
    }

    pub fn to_square_micrometers(&self, area_px: f64) -> f64 {
        area_px / (self.pixels_per_micrometer * self.pixels_per_micrometer)
    }
}
