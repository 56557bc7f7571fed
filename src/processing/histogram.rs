//! Histogram equalization: contrast-limited adaptive (CLAHE) and global.
//!
//! CLAHE follows the usual tile scheme: the image is split into an 8x8 grid,
//! each tile gets a clipped and redistributed histogram turned into a lookup
//! table, and every pixel is bilinearly interpolated between the four nearest
//! tile tables. Images whose size is not a multiple of the grid are padded by
//! reflection before the tile histograms are taken.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::equalize_histogram;
use palette::{FromColor, Lab, LinSrgb, Srgb};

use super::{reflect101, saturate_u8};

pub const CLAHE_TILE_GRID: usize = 8;
const HIST_SIZE: usize = 256;

/// Applies CLAHE with an 8x8 tile grid. `clip_limit <= 0` disables clipping.
pub fn clahe(src: &GrayImage, clip_limit: f32) -> GrayImage {
    let (width, height) = (src.width() as usize, src.height() as usize);
    if width == 0 || height == 0 {
        return src.clone();
    }

    let tiles = CLAHE_TILE_GRID;
    let (ext_width, ext_height) = if width % tiles == 0 && height % tiles == 0 {
        (width, height)
    } else {
        // both axes get padded as soon as one of them is not a multiple of the grid
        (width + tiles - width % tiles, height + tiles - height % tiles)
    };
    let tile_width = ext_width / tiles;
    let tile_height = ext_height / tiles;
    let tile_area = tile_width * tile_height;

    let clip = (clip_limit > 0.0).then(|| ((clip_limit * tile_area as f32 / HIST_SIZE as f32) as usize).max(1));

    let pixel = |x: usize, y: usize| -> u8 {
        let sx = reflect101(x as i64, width as i64);
        let sy = reflect101(y as i64, height as i64);
        src.get_pixel(sx as u32, sy as u32)[0]
    };

    let lut_scale = (HIST_SIZE - 1) as f32 / tile_area as f32;
    let mut luts = vec![[0u8; HIST_SIZE]; tiles * tiles];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut hist = [0usize; HIST_SIZE];
            for y in ty * tile_height..(ty + 1) * tile_height {
                for x in tx * tile_width..(tx + 1) * tile_width {
                    hist[pixel(x, y) as usize] += 1;
                }
            }
            if let Some(clip) = clip {
                clip_histogram(&mut hist, clip);
            }
            let lut = &mut luts[ty * tiles + tx];
            let mut sum = 0usize;
            for (value, count) in hist.iter().enumerate() {
                sum += count;
                lut[value] = saturate_u8(sum as f32 * lut_scale);
            }
        }
    }

    let tile_coords = |pos: usize, tile_size: usize| -> (usize, usize, f32) {
        let f = pos as f32 / tile_size as f32 - 0.5;
        let lo = f.floor();
        let weight = f - lo;
        let lo = lo as i64;
        let first = lo.max(0) as usize;
        let second = ((lo + 1) as usize).min(tiles - 1);
        (first, second, weight)
    };

    let mut out = GrayImage::new(width as u32, height as u32);
    for y in 0..height {
        let (ty1, ty2, ya) = tile_coords(y, tile_height);
        for x in 0..width {
            let (tx1, tx2, xa) = tile_coords(x, tile_width);
            let v = src.get_pixel(x as u32, y as u32)[0] as usize;
            let top = luts[ty1 * tiles + tx1][v] as f32 * (1.0 - xa) + luts[ty1 * tiles + tx2][v] as f32 * xa;
            let bottom = luts[ty2 * tiles + tx1][v] as f32 * (1.0 - xa) + luts[ty2 * tiles + tx2][v] as f32 * xa;
            out.put_pixel(x as u32, y as u32, Luma([saturate_u8(top * (1.0 - ya) + bottom * ya)]));
        }
    }
    out
}

/// Clips every bin to `clip` and spreads the excess evenly, the remainder one
/// count at a time across evenly spaced bins.
fn clip_histogram(hist: &mut [usize; HIST_SIZE], clip: usize) {
    let mut clipped = 0;
    for count in hist.iter_mut() {
        if *count > clip {
            clipped += *count - clip;
            *count = clip;
        }
    }

    let batch = clipped / HIST_SIZE;
    let mut residual = clipped - batch * HIST_SIZE;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (HIST_SIZE / residual).max(1);
        let mut i = 0;
        while i < HIST_SIZE && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

/// CLAHE on the L channel of CIELAB, leaving chroma untouched.
pub fn clahe_lightness(image: &RgbImage, clip_limit: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let labs: Vec<Lab> = image
        .pixels()
        .map(|p| Lab::from_color(Srgb::new(p[0], p[1], p[2]).into_format::<f32>().into_linear()))
        .collect();

    // L is quantized to 0..=255 for equalization
    let lightness = GrayImage::from_fn(width, height, |x, y| {
        let l = labs[(y * width + x) as usize].l;
        Luma([saturate_u8(l * 255.0 / 100.0)])
    });
    let equalized = clahe(&lightness, clip_limit);

    let mut out = RgbImage::new(width, height);
    for ((dst, lab), l) in out.pixels_mut().zip(labs.iter()).zip(equalized.pixels()) {
        let lab: Lab = Lab::new(l[0] as f32 * 100.0 / 255.0, lab.a, lab.b);
        let rgb: Srgb<u8> = Srgb::<f32>::from_linear(LinSrgb::from_color(lab)).into_format();
        dst.0 = [rgb.red, rgb.green, rgb.blue];
    }
    out
}

/// Global histogram equalization of the luma channel in YCrCb.
pub fn equalize_luma(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let ycrcb: Vec<[f32; 3]> = image.pixels().map(|p| rgb_to_ycrcb(p.0)).collect();
    let luma = GrayImage::from_fn(width, height, |x, y| {
        Luma([saturate_u8(ycrcb[(y * width + x) as usize][0])])
    });
    let equalized = equalize_histogram(&luma);

    let mut out = RgbImage::new(width, height);
    for ((dst, [_, cr, cb]), y) in out.pixels_mut().zip(ycrcb.iter().copied()).zip(equalized.pixels()) {
        dst.0 = ycrcb_to_rgb(y[0] as f32, cr, cb);
    }
    out
}

fn rgb_to_ycrcb([r, g, b]: [u8; 3]) -> [f32; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cr = (r - y) * 0.713 + 128.0;
    let cb = (b - y) * 0.564 + 128.0;
    [y, cr, cb]
}

fn ycrcb_to_rgb(y: f32, cr: f32, cb: f32) -> [u8; 3] {
    let r = y + 1.403 * (cr - 128.0);
    let g = y - 0.714 * (cr - 128.0) - 0.344 * (cb - 128.0);
    let b = y + 1.773 * (cb - 128.0);
    [saturate_u8(r), saturate_u8(g), saturate_u8(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_redistributes_the_excess() {
        let mut hist = [0usize; HIST_SIZE];
        hist[10] = 300;
        clip_histogram(&mut hist, 40);
        assert_eq!(hist.iter().sum::<usize>(), 300);
        assert_eq!(hist[10], 41);
    }

    #[test]
    fn clahe_keeps_a_flat_image_flat() {
        let flat = GrayImage::from_pixel(37, 21, Luma([90]));
        let out = clahe(&flat, 3.0);
        assert_eq!(out.dimensions(), (37, 21));
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn ycrcb_round_trip_is_close() {
        let [y, cr, cb] = rgb_to_ycrcb([200, 40, 90]);
        let [r, g, b] = ycrcb_to_rgb(y, cr, cb);
        assert!((r as i32 - 200).abs() <= 1);
        assert!((g as i32 - 40).abs() <= 1);
        assert!((b as i32 - 90).abs() <= 1);
    }
}
