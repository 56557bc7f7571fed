//! Lesion contour measurement and the lesion gallery thumbnails.
//!
//! Each lesion box is padded, binarized with a polarity chosen from its class
//! name, cleaned, and reduced to its largest external contour. The contour's
//! area and minimum-area rectangle are converted to micrometers with the
//! session calibration. Summary text and gallery thumbnails both go through
//! [`measure_lesion`].

use std::fmt;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::filter::separable_filter_equal;
use imageproc::geometry::{convex_hull, min_area_rect};
use imageproc::point::Point;
use kornia::image::allocator::CpuAllocator;
use kornia::imgproc;
use serde::Serialize;
use tracing::debug;

use super::morphology::close_then_open;
use super::render::{draw_polygon, draw_thick_line};
use super::{CpuImage, from_kornia_gray, saturate_u8, to_kornia_rgb};
use crate::detection::DetectionBox;
use crate::error::{AnalysisError, AnalysisResult};
use crate::geometry::{BoundingBox, Calibration};

pub const CROP_PADDING: i32 = 20;
pub const THUMBNAIL_MAX_SIZE: u32 = 250;
const DARK_LESION_THRESHOLD: u8 = 60;
const BRIGHT_LESION_THRESHOLD: u8 = 200;
const ADAPTIVE_BLOCK_SIZE: usize = 11;
const ADAPTIVE_SIGMA: f32 = 2.0;
const ADAPTIVE_OFFSET: i32 = 2;
const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const RECT_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const MEASURE_LINE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const LINE_THICKNESS: i32 = 2;
const MEASURE_LINE_OFFSET: f32 = 10.0;

pub const NO_CONTOUR_MESSAGE: &str = "No contour found for measurement";

/// Which pixels of a lesion crop count as lesion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LesionPolarity {
    /// Hemorrhages: dark regions below a fixed threshold.
    Dark,
    /// Exudates: bright regions above a fixed threshold.
    Bright,
    /// Anything else: locally darker than the Gaussian-weighted neighbourhood.
    Adaptive,
}

impl LesionPolarity {
    pub fn from_class_name(class_name: &str) -> Self {
        let name = class_name.to_lowercase();
        if name.contains("hemorrhage") || name.contains("blood") {
            LesionPolarity::Dark
        } else if name.contains("exudate") || name.contains("bright") {
            LesionPolarity::Bright
        } else {
            LesionPolarity::Adaptive
        }
    }
}

/// Physical size of one lesion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub area_um2: f64,
    pub width_um: f64,
    pub height_um: f64,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Area: {:.1}µm² | Size: {:.1}×{:.1}µm",
            self.area_um2, self.width_um, self.height_um
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementOutcome {
    Measured(Measurement),
    NoContour,
}

impl fmt::Display for MeasurementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementOutcome::Measured(m) => fmt::Display::fmt(m, f),
            MeasurementOutcome::NoContour => f.write_str(NO_CONTOUR_MESSAGE),
        }
    }
}

/// Largest external contour of a crop and its minimum-area rectangle, in crop pixels.
///
/// `rect` holds integer corners for drawing only. The side lengths are the
/// exact extents of the minimum-area rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourFit {
    pub points: Vec<Point<i32>>,
    pub rect: [Point<i32>; 4],
    pub area_px: f64,
    pub width_px: f64,
    pub height_px: f64,
}

impl ContourFit {
    pub fn from_contour(points: Vec<Point<i32>>) -> Self {
        let rect = min_area_rect(&points);
        let (width_px, height_px) = min_area_sides(&convex_hull(points.as_slice()));
        Self {
            area_px: polygon_area(&points),
            width_px,
            height_px,
            rect,
            points,
        }
    }

    pub fn measure(&self, calibration: &Calibration) -> Measurement {
        Measurement {
            area_um2: calibration.to_square_micrometers(self.area_px),
            width_um: calibration.to_micrometers(self.width_px),
            height_um: calibration.to_micrometers(self.height_px),
        }
    }

    fn rect_center(&self) -> (f32, f32) {
        let (sx, sy) = self
            .rect
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f32, sy + p.y as f32));
        (sx / 4.0, sy / 4.0)
    }
}

/// One lesion's crop, contour and measurement.
#[derive(Debug, Clone)]
pub struct LesionMeasurement {
    /// Padded crop region in image coordinates.
    pub region: BoundingBox,
    pub crop: RgbImage,
    pub contour: Option<ContourFit>,
    pub outcome: MeasurementOutcome,
}

/// Crops, binarizes and measures one lesion.
pub fn measure_lesion(
    image: &RgbImage,
    lesion: &DetectionBox,
    calibration: &Calibration,
) -> AnalysisResult<LesionMeasurement> {
    let region = lesion
        .bounding_box
        .padded_within(CROP_PADDING, image.width(), image.height())
        .ok_or_else(|| AnalysisError::computation(format!("{} box lies outside the image", lesion.class_name)))?;
    let crop = imageops::crop_imm(
        image,
        region.x1 as u32,
        region.y1 as u32,
        region.width() as u32,
        region.height() as u32,
    )
    .to_image();

    let polarity = LesionPolarity::from_class_name(&lesion.class_name);
    let binary = close_then_open(&binarize(&crop, polarity)?);
    let contour = largest_external_contour(&binary).map(ContourFit::from_contour);
    let outcome = match &contour {
        Some(fit) => MeasurementOutcome::Measured(fit.measure(calibration)),
        None => MeasurementOutcome::NoContour,
    };
    debug!(class = %lesion.class_name, ?polarity, %outcome, "lesion measured");

    Ok(LesionMeasurement {
        region,
        crop,
        contour,
        outcome,
    })
}

/// Foreground mask (255) of a lesion crop.
pub fn binarize(crop: &RgbImage, polarity: LesionPolarity) -> AnalysisResult<GrayImage> {
    let rgb = to_kornia_rgb(crop)?;
    let mut gray = CpuImage::<u8, 1>::from_size_val(rgb.size(), 0u8, CpuAllocator)?;
    imgproc::color::gray_from_rgb_u8(&rgb, &mut gray)?;

    let mut binary = CpuImage::<u8, 1>::from_size_val(gray.size(), 0u8, CpuAllocator)?;
    match polarity {
        LesionPolarity::Dark => {
            imgproc::threshold::threshold_binary_inverse(&gray, &mut binary, DARK_LESION_THRESHOLD, 255)?;
        }
        LesionPolarity::Bright => {
            imgproc::threshold::threshold_binary(&gray, &mut binary, BRIGHT_LESION_THRESHOLD, 255)?;
        }
        LesionPolarity::Adaptive => return Ok(adaptive_threshold_inverse(&from_kornia_gray(&gray)?)),
    }
    from_kornia_gray(&binary)
}

/// Foreground where a pixel is at least `ADAPTIVE_OFFSET` below its
/// Gaussian-weighted 11x11 neighbourhood mean.
fn adaptive_threshold_inverse(gray: &GrayImage) -> GrayImage {
    let kernel = gaussian_kernel(ADAPTIVE_BLOCK_SIZE, ADAPTIVE_SIGMA);
    let as_float: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| Luma([gray.get_pixel(x, y)[0] as f32]));
    let mean = separable_filter_equal(&as_float, &kernel);

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let local_mean = saturate_u8(mean.get_pixel(x, y)[0]) as i32;
        let delta = gray.get_pixel(x, y)[0] as i32 - local_mean;
        Luma([if delta <= -ADAPTIVE_OFFSET { 255 } else { 0 }])
    })
}

fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let center = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Points of the largest top-level outer contour. Equal areas keep the first found.
pub fn largest_external_contour(binary: &GrayImage) -> Option<Vec<Point<i32>>> {
    let contours: Vec<Contour<i32>> = find_contours(binary);
    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .fold(None, |best: Option<(f64, Vec<Point<i32>>)>, c| {
            let area = polygon_area(&c.points);
            match best {
                Some((best_area, _)) if area <= best_area => best,
                _ => Some((area, c.points)),
            }
        })
        .map(|(_, points)| points)
}

/// Sides of the minimum-area enclosing rectangle of a convex hull, by rotating
/// calipers. The first side lies along the hull edge the rectangle is flush with.
pub fn min_area_sides(hull: &[Point<i32>]) -> (f64, f64) {
    let mut best: Option<(f64, f64, f64)> = None;
    for (i, a) in hull.iter().enumerate() {
        let b = hull[(i + 1) % hull.len()];
        let (ex, ey) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
        let length = ex.hypot(ey);
        if length == 0.0 {
            continue;
        }
        let (ux, uy) = (ex / length, ey / length);
        let (mut along_min, mut along_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut across_min, mut across_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in hull {
            let (px, py) = ((p.x - a.x) as f64, (p.y - a.y) as f64);
            let along = px * ux + py * uy;
            let across = py * ux - px * uy;
            along_min = along_min.min(along);
            along_max = along_max.max(along);
            across_min = across_min.min(across);
            across_max = across_max.max(across);
        }
        let (side_a, side_b) = (along_max - along_min, across_max - across_min);
        let area = side_a * side_b;
        if best.is_none_or(|(best_area, _, _)| area < best_area) {
            best = Some((area, side_a, side_b));
        }
    }
    best.map_or((0.0, 0.0), |(_, side_a, side_b)| (side_a, side_b))
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// Crop with the contour (green), its rectangle (blue) and the two
/// measurement lines (cyan), shrunk to fit 250x250.
pub fn gallery_thumbnail(measurement: &LesionMeasurement) -> RgbImage {
    let mut canvas = measurement.crop.clone();
    if let Some(fit) = &measurement.contour {
        draw_polygon(&mut canvas, &fit.points, CONTOUR_COLOR, LINE_THICKNESS);
        draw_polygon(&mut canvas, &fit.rect, RECT_COLOR, LINE_THICKNESS);

        let (cx, cy) = fit.rect_center();
        let (half_w, half_h) = (fit.width_px as f32 / 2.0, fit.height_px as f32 / 2.0);
        draw_thick_line(
            &mut canvas,
            (cx - half_w, cy - MEASURE_LINE_OFFSET),
            (cx + half_w, cy - MEASURE_LINE_OFFSET),
            MEASURE_LINE_COLOR,
            LINE_THICKNESS,
        );
        draw_thick_line(
            &mut canvas,
            (cx + MEASURE_LINE_OFFSET, cy - half_h),
            (cx + MEASURE_LINE_OFFSET, cy + half_h),
            MEASURE_LINE_COLOR,
            LINE_THICKNESS,
        );
    }
    fit_within(&canvas, THUMBNAIL_MAX_SIZE)
}

/// Downscales to fit a `max_size` square, keeping the aspect ratio.
pub fn fit_within(image: &RgbImage, max_size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= max_size && height <= max_size {
        return image.clone();
    }
    let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);
    imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polarity_follows_class_name() {
        assert_eq!(LesionPolarity::from_class_name("Hemorrhage"), LesionPolarity::Dark);
        assert_eq!(LesionPolarity::from_class_name("blood_spot"), LesionPolarity::Dark);
        assert_eq!(LesionPolarity::from_class_name("hard_exudate"), LesionPolarity::Bright);
        assert_eq!(LesionPolarity::from_class_name("microaneurysm"), LesionPolarity::Adaptive);
    }

    #[test]
    fn shoelace_area_of_square() {
        let square = [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        assert_eq!(polygon_area(&square), 100.0);
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(ADAPTIVE_BLOCK_SIZE, ADAPTIVE_SIGMA);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(kernel[0], kernel[10]);
        assert!(kernel[5] > kernel[4]);
    }

    fn rotated_bar(length: f64, thickness: f64, degrees: f64) -> GrayImage {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let (cx, cy) = (80.0, 80.0);
        let corner = |u: f64, v: f64| {
            Point::new(
                (cx + u * cos - v * sin).round() as i32,
                (cy + u * sin + v * cos).round() as i32,
            )
        };
        let (hl, ht) = (length / 2.0, thickness / 2.0);
        let polygon = [corner(-hl, -ht), corner(hl, -ht), corner(hl, ht), corner(-hl, ht)];
        let mut mask = GrayImage::new(160, 160);
        imageproc::drawing::draw_polygon_mut(&mut mask, &polygon, Luma([255]));
        mask
    }

    #[test]
    fn rotated_bar_keeps_its_true_size() {
        for degrees in [10.0, 20.0, 30.0, 37.0] {
            let contour = largest_external_contour(&rotated_bar(60.0, 12.0, degrees)).expect("bar contour");
            let fit = ContourFit::from_contour(contour);
            let long = fit.width_px.max(fit.height_px);
            let short = fit.width_px.min(fit.height_px);
            assert!((58.5..=61.5).contains(&long), "{degrees}°: long side {long}");
            assert!((11.0..=12.8).contains(&short), "{degrees}°: short side {short}");
        }
    }

    #[test]
    fn min_area_sides_of_degenerate_hulls() {
        assert_eq!(min_area_sides(&[]), (0.0, 0.0));
        assert_eq!(min_area_sides(&[Point::new(3, 3)]), (0.0, 0.0));
        assert_eq!(min_area_sides(&[Point::new(0, 0), Point::new(0, 7)]), (7.0, 0.0));
        let square = [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        assert_eq!(min_area_sides(&square), (10.0, 10.0));
    }

    #[test]
    fn measurement_lines_are_cyan() {
        let mut image = RgbImage::from_pixel(100, 100, Rgb([150, 150, 150]));
        for y in 35..65 {
            for x in 35..65 {
                image.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        let lesion = DetectionBox::new("hemorrhage", 0.9, BoundingBox::new(35, 35, 65, 65));
        let calibration = Calibration::new(1.0).expect("positive scale");
        let measured = measure_lesion(&image, &lesion, &calibration).expect("box inside image");
        let thumbnail = gallery_thumbnail(&measured);
        assert!(thumbnail.pixels().any(|p| *p == Rgb([0, 255, 255])));
        assert!(!thumbnail.pixels().any(|p| *p == Rgb([255, 255, 0])));
    }

    #[test]
    fn outcome_text() {
        let m = Measurement {
            area_um2: 1234.56,
            width_um: 300.0,
            height_um: 12.34,
        };
        assert_eq!(
            MeasurementOutcome::Measured(m).to_string(),
            "Area: 1234.6µm² | Size: 300.0×12.3µm"
        );
        assert_eq!(MeasurementOutcome::NoContour.to_string(), NO_CONTOUR_MESSAGE);
    }
}
