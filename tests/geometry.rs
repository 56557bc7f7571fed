use approx::assert_relative_eq;
use retina_analyzer::geometry::{
    BoundingBox, Calibration, LesionDistance, disc_diameter_from_box, distance, distance_in_dd, within_one_dd,
};

#[test]
fn box_center_truncates() {
    assert_eq!(BoundingBox::new(10, 10, 15, 15).center(), (12, 12));
    assert_eq!(BoundingBox::new(0, 0, 100, 50).center(), (50, 25));
}

#[test]
fn euclidean_distance_between_centers() {
    assert_relative_eq!(distance((0, 0), (3, 4)), 5.0);
    assert_relative_eq!(distance((7, 7), (7, 7)), 0.0);
}

#[test]
fn one_dd_circle_boundary_is_inclusive() {
    assert!(within_one_dd(50.0, 100.0));
    assert!(!within_one_dd(51.0, 100.0));
    assert!(within_one_dd(0.0, 100.0));
}

#[test]
fn dd_distance_needs_a_disc() {
    assert_eq!(distance_in_dd(50.0, 0.0), None);
    assert_relative_eq!(distance_in_dd(50.0, 200.0).expect("disc known"), 0.25);
}

#[test]
fn disc_diameter_scales_the_longer_side() {
    assert_eq!(disc_diameter_from_box(&BoundingBox::new(400, 300, 533, 400)), 200);
    assert_eq!(disc_diameter_from_box(&BoundingBox::new(0, 0, 10, 40)), 60);
}

#[test]
fn lesion_distance_from_macula() {
    let lesion = BoundingBox::new(100, 100, 140, 140);
    let d = LesionDistance::measure(&lesion, (110, 110), 200).expect("disc known");
    assert_eq!(d.center, (120, 120));
    assert_relative_eq!(d.distance_px, 14.142, epsilon = 1e-3);
    assert_relative_eq!(d.distance_dd, 0.0707, epsilon = 1e-4);
    assert!(d.within_one_dd);
    assert!(LesionDistance::measure(&lesion, (110, 110), 0).is_none());
}

#[test]
fn calibration_from_disc_diameter() {
    let calibration = Calibration::from_disc_diameter(150).expect("positive diameter");
    assert_relative_eq!(calibration.pixels_per_micrometer(), 0.1);
    assert_relative_eq!(calibration.to_micrometers(30.0), 300.0);
    assert_relative_eq!(calibration.to_square_micrometers(1.0), 100.0, epsilon = 1e-9);
}

#[test]
fn calibration_falls_back_without_a_disc() {
    assert!(Calibration::from_disc_diameter(0).is_err());
    let from_width = Calibration::resolve(0, 1500);
    assert_relative_eq!(from_width.pixels_per_micrometer(), 0.1);
    let floor = Calibration::resolve(0, 0);
    assert_relative_eq!(floor.pixels_per_micrometer(), 0.1);
    let from_disc = Calibration::resolve(300, 1500);
    assert_relative_eq!(from_disc.pixels_per_micrometer(), 0.2);
}
