//! Non-local-means denoising for RGB images.
//!
//! Every pixel becomes a weighted mean of the pixels in its 21x21 search
//! window, weighted by how similar the 7x7 patch around each candidate is to
//! the patch around the pixel itself. Patch distances for one search offset
//! are summed over the whole image with an integral image, so the cost does
//! not depend on the patch size. Weights come from a table indexed by the
//! rounded mean squared difference and stop at [`WEIGHT_CUTOFF`].

use image::RgbImage;
use tracing::debug;

use super::{reflect101, saturate_u8};

const TEMPLATE_RADIUS: i64 = 3;
const SEARCH_RADIUS: i64 = 10;
/// Candidates whose weight falls below this contribute nothing.
const WEIGHT_CUTOFF: f64 = 1e-3;

/// Denoises `image` with filter strength `h`. `h == 0` returns a copy.
pub fn non_local_means(image: &RgbImage, h: f32) -> RgbImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if h <= 0.0 || width == 0 || height == 0 {
        return image.clone();
    }

    let pad = (TEMPLATE_RADIUS + SEARCH_RADIUS) as usize;
    let padded_width = width + 2 * pad;
    let padded_height = height + 2 * pad;
    let raw = image.as_raw();
    let mut padded = vec![0u8; padded_width * padded_height * 3];
    for py in 0..padded_height {
        let sy = reflect101(py as i64 - pad as i64, height as i64);
        for px in 0..padded_width {
            let sx = reflect101(px as i64 - pad as i64, width as i64);
            let src = (sy * width + sx) * 3;
            let dst = (py * padded_width + px) * 3;
            for c in 0..3 {
                padded[dst + c] = raw[src + c];
            }
        }
    }

    let template_side = (2 * TEMPLATE_RADIUS + 1) as u64;
    let normalizer = template_side * template_side * 3;
    let weight_table = weight_table(h);

    // distances are evaluated over the image grown by the template radius
    let t = TEMPLATE_RADIUS as usize;
    let side = 2 * t + 1;
    let region_width = width + 2 * t;
    let region_height = height + 2 * t;
    let stride = region_width + 1;
    let mut integral = vec![0u64; stride * (region_height + 1)];
    let mut accum = vec![0f64; width * height * 3];
    let mut weights = vec![0f64; width * height];

    for dy in -SEARCH_RADIUS..=SEARCH_RADIUS {
        for dx in -SEARCH_RADIUS..=SEARCH_RADIUS {
            let offset = dy * padded_width as i64 + dx;
            for ry in 0..region_height {
                let mut row_sum = 0u64;
                let row = (ry + SEARCH_RADIUS as usize) * padded_width + SEARCH_RADIUS as usize;
                for rx in 0..region_width {
                    let a = (row + rx) * 3;
                    let b = ((row + rx) as i64 + offset) as usize * 3;
                    let d: i32 = (0..3)
                        .map(|c| {
                            let diff = padded[a + c] as i32 - padded[b + c] as i32;
                            diff * diff
                        })
                        .sum();
                    row_sum += d as u64;
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + row_sum;
                }
            }

            for y in 0..height {
                for x in 0..width {
                    let (x1, y1) = (x + side, y + side);
                    let ssd = integral[y1 * stride + x1] + integral[y * stride + x]
                        - integral[y * stride + x1]
                        - integral[y1 * stride + x];
                    // mean squared difference per sample, rounded to the table step
                    let index = ((ssd + normalizer / 2) / normalizer) as usize;
                    let Some(&weight) = weight_table.get(index) else {
                        continue;
                    };

                    let q = (((y + pad) * padded_width + x + pad) as i64 + offset) as usize * 3;
                    let i = y * width + x;
                    for c in 0..3 {
                        accum[i * 3 + c] += weight * padded[q + c] as f64;
                    }
                    weights[i] += weight;
                }
            }
        }
    }

    debug!(width, height, h, "non-local means applied");

    let mut out = RgbImage::new(width as u32, height as u32);
    for (i, value) in out.iter_mut().enumerate() {
        *value = saturate_u8((accum[i] / weights[i / 3]) as f32);
    }
    out
}

/// `exp(-d / h^2)` for every mean squared patch difference `d` whose weight
/// is at least [`WEIGHT_CUTOFF`].
fn weight_table(h: f32) -> Vec<f64> {
    let h2 = h as f64 * h as f64;
    (0..=255 * 255)
        .map(|d| (-(d as f64) / h2).exp())
        .take_while(|w| *w >= WEIGHT_CUTOFF)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn flat_image_is_unchanged() {
        let flat = RgbImage::from_pixel(12, 9, Rgb([40, 120, 200]));
        assert_eq!(non_local_means(&flat, 5.0), flat);
    }

    #[test]
    fn isolated_speck_is_softened() {
        let mut noisy = RgbImage::from_pixel(24, 24, Rgb([100, 100, 100]));
        noisy.put_pixel(12, 12, Rgb([160, 160, 160]));
        let out = non_local_means(&noisy, 20.0);
        assert!(out.get_pixel(12, 12)[0] < 160);
    }

    #[test]
    fn dissimilar_patches_do_not_blend() {
        let halves = RgbImage::from_fn(24, 16, |x, _| if x < 12 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        assert_eq!(non_local_means(&halves, 5.0), halves);
    }

    #[test]
    fn weight_table_stops_at_the_cutoff() {
        let table = weight_table(5.0);
        assert_eq!(table[0], 1.0);
        assert!(table.iter().all(|w| *w >= WEIGHT_CUTOFF));
        // 25 * ln(1000) is about 172.7
        assert_eq!(table.len(), 173);
    }
}
