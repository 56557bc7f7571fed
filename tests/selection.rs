mod common;

use common::detection;
use retina_analyzer::Severity;
use retina_analyzer::detection::SeverityOutput;
use retina_analyzer::selection::{select_landmarks, select_lesions, select_severity};

#[test]
fn most_confident_disc_wins_in_any_order() {
    let low = detection("disc", 0.6, [0, 0, 100, 100]);
    let high = detection("disc", 0.9, [200, 200, 280, 260]);

    for boxes in [vec![low.clone(), high.clone()], vec![high.clone(), low.clone()]] {
        let landmarks = select_landmarks(&boxes);
        assert_eq!(landmarks.disc.as_ref(), Some(&high));
        assert_eq!(landmarks.disc_diameter_px, 120);
        assert!(landmarks.macula.is_none());
    }
}

#[test]
fn blood_boxes_are_not_landmarks() {
    let boxes = vec![
        detection("blood", 0.99, [0, 0, 10, 10]),
        detection("macula", 0.4, [100, 100, 120, 120]),
    ];
    let landmarks = select_landmarks(&boxes);
    assert_eq!(landmarks.macula_center(), Some((110, 110)));
    assert_eq!(landmarks.disc_diameter_px, 0);
    assert_eq!(landmarks.disc_count(), 0);
}

#[test]
fn severity_defaults_without_a_model() {
    let assessment = select_severity(None);
    assert_eq!(assessment.severity, Severity::NoDr);
    assert_eq!(assessment.confidence, 0.0);
}

#[test]
fn severity_from_probabilities() {
    let output = SeverityOutput::Probabilities(vec![0.1, 0.2, 0.6, 0.05, 0.05]);
    let assessment = select_severity(Some(&output));
    assert_eq!(assessment.severity, Severity::Moderate);
    assert_eq!(assessment.confidence, 0.6);
}

#[test]
fn severity_from_detection_boxes() {
    let output = SeverityOutput::Boxes(vec![
        detection("Mild", 0.3, [0, 0, 1, 1]),
        detection("Severe", 0.7, [0, 0, 1, 1]),
    ]);
    assert_eq!(select_severity(Some(&output)).severity, Severity::Severe);

    let empty = SeverityOutput::Boxes(Vec::new());
    assert_eq!(select_severity(Some(&empty)), Default::default());
}

#[test]
fn unknown_severity_label_keeps_the_default() {
    let output = SeverityOutput::Boxes(vec![detection("Glaucoma", 0.95, [0, 0, 1, 1])]);
    assert_eq!(select_severity(Some(&output)).severity, Severity::NoDr);

    let too_many = SeverityOutput::Probabilities(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    assert_eq!(select_severity(Some(&too_many)).confidence, 0.0);
}

#[test]
fn lesions_keep_detector_order() {
    let lesions = vec![
        detection("exudate", 0.2, [0, 0, 5, 5]),
        detection("hemorrhage", 0.9, [10, 10, 15, 15]),
    ];
    assert_eq!(select_lesions(lesions.clone()), lesions);
}

#[test]
fn zero_confidence_landmarks_are_ignored() {
    let boxes = vec![
        detection("disc", 0.0, [0, 0, 100, 100]),
        detection("macula", 0.0, [100, 100, 120, 120]),
    ];
    let landmarks = select_landmarks(&boxes);
    assert!(landmarks.disc.is_none());
    assert!(landmarks.macula.is_none());
    assert_eq!(landmarks.disc_diameter_px, 0);

    let with_real_disc = vec![detection("disc", 0.0, [0, 0, 100, 100]), detection("disc", 0.2, [0, 0, 20, 20])];
    assert_eq!(select_landmarks(&with_real_disc).disc_diameter_px, 30);
}
