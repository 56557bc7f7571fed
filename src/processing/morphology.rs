//! Binary mask clean-up.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{Mask, close, grayscale_close, open};

/// 5x5 elliptical structuring element:
///
/// ```text
/// . . # . .
/// # # # # #
/// # # # # #
/// # # # # #
/// . . # . .
/// ```
pub fn ellipse_5x5() -> Mask {
    let element = GrayImage::from_fn(5, 5, |x, y| {
        let on = (y != 0 && y != 4) || x == 2;
        Luma([if on { 255 } else { 0 }])
    });
    Mask::from_image(&element, 2, 2)
}

/// 3x3 close followed by 3x3 open.
pub fn close_then_open(mask: &GrayImage) -> GrayImage {
    open(&close(mask, Norm::LInf, 1), Norm::LInf, 1)
}

/// Vessel mask clean-up: 3x3 open, 3x3 close, then a close with the 5x5 ellipse.
pub fn post_process(mask: &GrayImage) -> GrayImage {
    let cleaned = close(&open(mask, Norm::LInf, 1), Norm::LInf, 1);
    grayscale_close(&cleaned, &ellipse_5x5())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_removes_single_pixel_speckle() {
        let mut mask = GrayImage::new(20, 20);
        mask.put_pixel(5, 5, Luma([255]));
        let cleaned = post_process(&mask);
        assert!(cleaned.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn close_bridges_a_one_pixel_gap() {
        let mut mask = GrayImage::new(20, 9);
        for x in 2..18 {
            for y in 3..6 {
                if x != 10 {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let cleaned = post_process(&mask);
        assert_eq!(cleaned.get_pixel(10, 4)[0], 255);
    }
}
