#![allow(dead_code)]

use image::{Rgb, RgbImage};
use retina_analyzer::DetectionBox;
use retina_analyzer::geometry::BoundingBox;

/// Orange-red field with darker vertical and horizontal vessel stripes and a
/// bright disc, roughly the palette of a fundus photograph.
pub fn synthetic_fundus(width: u32, height: u32) -> RgbImage {
    let disc = (width as i64 * 3 / 4, height as i64 / 2);
    let disc_radius = (width.min(height) / 10) as i64;
    RgbImage::from_fn(width, height, |x, y| {
        let (dx, dy) = (x as i64 - disc.0, y as i64 - disc.1);
        if dx * dx + dy * dy <= disc_radius * disc_radius {
            Rgb([250, 230, 180])
        } else if x % 40 < 3 || y % 55 < 3 {
            Rgb([120, 30, 20])
        } else {
            Rgb([200, 90, 40])
        }
    })
}

pub fn uniform(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

/// Paints a filled square of `color` with its top-left corner at (x, y).
pub fn paint_square(image: &mut RgbImage, x: u32, y: u32, side: u32, color: [u8; 3]) {
    for yy in y..(y + side).min(image.height()) {
        for xx in x..(x + side).min(image.width()) {
            image.put_pixel(xx, yy, Rgb(color));
        }
    }
}

pub fn detection(class_name: &str, confidence: f32, b: [i32; 4]) -> DetectionBox {
    DetectionBox::new(class_name, confidence, BoundingBox::from(b))
}
