mod common;

use common::synthetic_fundus;
use image::{GrayImage, Luma, RgbImage};
use retina_analyzer::VesselSettings;
use retina_analyzer::detection::VesselNetwork;
use retina_analyzer::error::AnalysisResult;
use retina_analyzer::processing::vessels::{
    MODEL_INPUT_SIZE, ModelInput, VesselMethod, colorize, overlay, segment, vessel_density,
};

/// Returns the same logit for every pixel.
struct ConstantNetwork(f32);

impl VesselNetwork for ConstantNetwork {
    fn forward(&self, input: &ModelInput) -> AnalysisResult<Vec<f32>> {
        assert_eq!(input.data.len(), 3 * (MODEL_INPUT_SIZE * MODEL_INPUT_SIZE) as usize);
        Ok(vec![self.0; (MODEL_INPUT_SIZE * MODEL_INPUT_SIZE) as usize])
    }
}

struct TruncatedNetwork;

impl VesselNetwork for TruncatedNetwork {
    fn forward(&self, _input: &ModelInput) -> AnalysisResult<Vec<f32>> {
        Ok(vec![1.0; 16])
    }
}

fn without_post_process() -> VesselSettings {
    VesselSettings {
        post_process: false,
        ..VesselSettings::default()
    }
}

#[test]
fn density_bounds() {
    assert_eq!(vessel_density(&GrayImage::new(20, 20)), 0.0);
    assert_eq!(vessel_density(&GrayImage::from_pixel(20, 20, Luma([255]))), 100.0);

    let mut half = GrayImage::new(10, 10);
    for y in 0..5 {
        for x in 0..10 {
            half.put_pixel(x, y, Luma([255]));
        }
    }
    assert_eq!(vessel_density(&half), 50.0);
}

#[test]
fn network_mask_follows_the_threshold() {
    let image = synthetic_fundus(96, 64);
    let settings = without_post_process();

    let all = segment(&image, Some(&ConstantNetwork(8.0)), &settings).expect("segmentation");
    assert_eq!(all.method, VesselMethod::Model);
    assert_eq!(all.mask.dimensions(), (96, 64));
    assert_eq!(all.density, 100.0);

    let none = segment(&image, Some(&ConstantNetwork(-8.0)), &settings).expect("segmentation");
    assert_eq!(none.density, 0.0);
}

#[test]
fn wrong_sized_network_output_is_an_error() {
    let image = synthetic_fundus(32, 32);
    assert!(segment(&image, Some(&TruncatedNetwork), &without_post_process()).is_err());
}

#[test]
fn traditional_strategy_without_a_network() {
    let image = synthetic_fundus(120, 90);
    let result = segment(&image, None, &VesselSettings::default()).expect("segmentation");
    assert_eq!(result.method, VesselMethod::Traditional);
    assert_eq!(result.mask.dimensions(), (120, 90));
    assert!(result.mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    assert!((0.0..=100.0).contains(&result.density));
}

#[test]
fn use_model_off_ignores_the_network() {
    let image = synthetic_fundus(64, 64);
    let settings = VesselSettings {
        use_model: false,
        ..without_post_process()
    };
    let result = segment(&image, Some(&ConstantNetwork(8.0)), &settings).expect("segmentation");
    assert_eq!(result.method, VesselMethod::Traditional);
}

#[test]
fn overlay_blends_only_toward_the_vessel_color() {
    let original = RgbImage::from_pixel(4, 4, image::Rgb([100, 100, 100]));
    let mask = GrayImage::from_pixel(4, 4, Luma([255]));
    assert_eq!(colorize(&mask, [255, 0, 0]).get_pixel(0, 0).0, [255, 0, 0]);

    let blended = overlay(&original, &mask, [255, 0, 0], 0.5);
    assert_eq!(blended.get_pixel(1, 1).0, [178, 50, 50]);
}
