//! Tie-break rules over raw detector outputs.

use serde::Serialize;

use crate::detection::{DetectionBox, Severity, SeverityOutput};
use crate::geometry::{PixelPoint, disc_diameter_from_box};

const EXCLUDED_LANDMARK_CLASS: &str = "blood";
const MACULA_CLASS: &str = "macula";
const DISC_CLASS: &str = "disc";

/// Selected severity grade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeverityAssessment {
    pub severity: Severity,
    pub confidence: f32,
}

/// Picks the single most confident grade. `None` (no model) yields No_DR at 0,
/// and so does a winning class that is not one of the five grades.
pub fn select_severity(output: Option<&SeverityOutput>) -> SeverityAssessment {
    let winner = match output {
        Some(SeverityOutput::Probabilities(probabilities)) => argmax(probabilities)
            .and_then(|(index, confidence)| Some((Severity::from_index(index)?, confidence))),
        Some(SeverityOutput::Boxes(boxes)) => most_confident(boxes.iter())
            .and_then(|best| Some((best.class_name.parse::<Severity>().ok()?, best.confidence))),
        None => None,
    };
    winner
        .map(|(severity, confidence)| SeverityAssessment { severity, confidence })
        .unwrap_or_default()
}

/// Lesions pass through unfiltered, in detector order.
pub fn select_lesions(boxes: Vec<DetectionBox>) -> Vec<DetectionBox> {
    boxes
}

/// Winning macula and optic-disc boxes plus the disc diameter derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    pub macula: Option<DetectionBox>,
    pub disc: Option<DetectionBox>,
    /// Zero when no disc was found.
    pub disc_diameter_px: u32,
}

impl Landmarks {
    pub fn macula_center(&self) -> Option<PixelPoint> {
        self.macula.as_ref().map(|b| b.bounding_box.center())
    }

    pub fn disc_center(&self) -> Option<PixelPoint> {
        self.disc.as_ref().map(|b| b.bounding_box.center())
    }

    pub fn macula_count(&self) -> usize {
        usize::from(self.macula.is_some())
    }

    pub fn disc_count(&self) -> usize {
        usize::from(self.disc.is_some())
    }
}

/// Keeps the most confident "macula" and "disc" box, ignoring "blood" and
/// zero-confidence boxes. Equal confidences keep the first box seen.
pub fn select_landmarks(boxes: &[DetectionBox]) -> Landmarks {
    let candidates = || boxes.iter().filter(|b| b.class_name != EXCLUDED_LANDMARK_CLASS);
    let macula = most_confident(candidates().filter(|b| b.class_name == MACULA_CLASS)).cloned();
    let disc = most_confident(candidates().filter(|b| b.class_name == DISC_CLASS)).cloned();
    let disc_diameter_px = disc
        .as_ref()
        .map_or(0, |d| disc_diameter_from_box(&d.bounding_box));

    Landmarks {
        macula,
        disc,
        disc_diameter_px,
    }
}

/// Most confident box with a positive confidence.
fn most_confident<'a>(boxes: impl Iterator<Item = &'a DetectionBox>) -> Option<&'a DetectionBox> {
    boxes.filter(|b| b.confidence > 0.0).fold(None, |best: Option<&DetectionBox>, candidate| match best {
        Some(current) if candidate.confidence <= current.confidence => Some(current),
        _ => Some(candidate),
    })
}

fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, current)) if v <= current => best,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_keeps_first_of_equal_values() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax(&[]), None);
    }
}
