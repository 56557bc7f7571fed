//! Annotated display images and the drawing helpers shared by the gallery.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use serde::Serialize;

use crate::detection::DetectionBox;
use crate::geometry::BoundingBox;
use crate::selection::Landmarks;

pub const LESION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const MACULA_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const DISC_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const DD_CIRCLE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const MIN_BOX_THICKNESS: i32 = 2;
const BOX_THICKNESS_RATIO: f64 = 0.015;

/// What the vessel display shows. Cycles Off -> Overlay -> VesselsOnly -> Off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
pub enum VesselView {
    #[default]
    Off,
    Overlay,
    VesselsOnly,
}

impl VesselView {
    pub fn next(self) -> Self {
        match self {
            VesselView::Off => VesselView::Overlay,
            VesselView::Overlay => VesselView::VesselsOnly,
            VesselView::VesselsOnly => VesselView::Off,
        }
    }
}

/// `max(2, floor(min(w, h) * 0.015))`.
pub fn box_thickness(b: &BoundingBox) -> i32 {
    let shorter = b.width().min(b.height()).max(0) as f64;
    MIN_BOX_THICKNESS.max((shorter * BOX_THICKNESS_RATIO) as i32)
}

pub fn draw_lesion_boxes(canvas: &mut RgbImage, lesions: &[DetectionBox]) {
    for lesion in lesions {
        let b = &lesion.bounding_box;
        draw_thick_rect(canvas, b, LESION_COLOR, box_thickness(b));
    }
}

/// Macula and disc boxes plus the 1 DD circle around the macula center.
pub fn draw_landmarks(canvas: &mut RgbImage, landmarks: &Landmarks) {
    for (landmark, color) in [(&landmarks.macula, MACULA_COLOR), (&landmarks.disc, DISC_COLOR)] {
        if let Some(found) = landmark {
            let b = &found.bounding_box;
            draw_thick_rect(canvas, b, color, box_thickness(b));
        }
    }
    if let Some(center) = landmarks.macula_center()
        && landmarks.disc_diameter_px > 0
    {
        let radius = (landmarks.disc_diameter_px / 2) as i32;
        draw_thick_circle(canvas, center, radius, DD_CIRCLE_COLOR, MIN_BOX_THICKNESS);
    }
}

/// Rectangle outline `thickness` pixels wide, centered on the box edges.
pub fn draw_thick_rect(canvas: &mut RgbImage, b: &BoundingBox, color: Rgb<u8>, thickness: i32) {
    let first = -(thickness / 2);
    for offset in first..first + thickness {
        let width = b.width() - 2 * offset + 1;
        let height = b.height() - 2 * offset + 1;
        if width <= 0 || height <= 0 {
            continue;
        }
        let rect = Rect::at(b.x1 + offset, b.y1 + offset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

pub fn draw_thick_line(canvas: &mut RgbImage, start: (f32, f32), end: (f32, f32), color: Rgb<u8>, thickness: i32) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = dx.hypot(dy);
    let (nx, ny) = if length > 0.0 { (-dy / length, dx / length) } else { (0.0, 0.0) };
    let first = -(thickness / 2);
    for offset in first..first + thickness {
        let o = offset as f32;
        draw_line_segment_mut(
            canvas,
            (start.0 + nx * o, start.1 + ny * o),
            (end.0 + nx * o, end.1 + ny * o),
            color,
        );
    }
}

/// Closed polyline through `points`.
pub fn draw_polygon(canvas: &mut RgbImage, points: &[Point<i32>], color: Rgb<u8>, thickness: i32) {
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        draw_thick_line(
            canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            color,
            thickness,
        );
    }
}

pub fn draw_thick_circle(canvas: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>, thickness: i32) {
    let first = -(thickness / 2);
    for offset in first..first + thickness {
        let r = radius + offset;
        if r > 0 {
            draw_hollow_circle_mut(canvas, center, r, color);
        }
    }
}
