mod common;

use common::{synthetic_fundus, uniform};
use retina_analyzer::VesselSettings;
use retina_analyzer::processing::enhance::{enhance, gamma_table, try_enhance};

#[test]
fn extreme_images_keep_their_dimensions() {
    let settings = VesselSettings::default();
    for value in [0u8, 255] {
        let image = uniform(48, 32, value);
        let enhanced = enhance(&image, &settings);
        assert_eq!(enhanced.dimensions(), (48, 32));
    }
}

#[test]
fn extreme_images_survive_two_passes() {
    let settings = VesselSettings::default();
    for value in [0u8, 255] {
        let image = uniform(40, 30, value);
        let once = try_enhance(&image, &settings).expect("first pass");
        let twice = try_enhance(&once, &settings).expect("second pass");
        assert_eq!(twice.dimensions(), (40, 30));
        assert_eq!(enhance(&enhance(&image, &settings), &settings), twice);
    }
}

#[test]
fn enhancement_is_deterministic() {
    let settings = VesselSettings::default();
    let image = synthetic_fundus(64, 48);
    assert_eq!(enhance(&image, &settings), enhance(&image, &settings));
}

#[test]
fn every_optional_stage_can_run() {
    let settings = VesselSettings {
        denoise_strength: 12,
        invert: true,
        equalize_hist: true,
        gamma: 1.6,
        ..VesselSettings::default()
    };
    let image = synthetic_fundus(40, 40);
    let enhanced = try_enhance(&image, &settings).expect("valid settings");
    assert_eq!(enhanced.dimensions(), image.dimensions());
}

#[test]
fn invalid_settings_return_the_original_image() {
    let settings = VesselSettings {
        gamma: 0.0,
        ..VesselSettings::default()
    };
    let image = synthetic_fundus(32, 32);
    assert!(try_enhance(&image, &settings).is_err());
    assert_eq!(enhance(&image, &settings), image);
}

#[test]
fn unit_gamma_is_the_identity() {
    let table = gamma_table(1.0);
    assert!(table.iter().enumerate().all(|(i, v)| *v as usize == i));
}
