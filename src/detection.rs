//! Detector outputs and the model collaborator contracts.

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::info;

use crate::error::AnalysisResult;
use crate::geometry::BoundingBox;
use crate::processing::vessels::ModelInput;

/// One box produced by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub class_name: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
}

impl DetectionBox {
    pub fn new(class_name: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bounding_box,
        }
    }
}

/// Diabetic-retinopathy grade, in classifier output order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Severity {
    #[default]
    #[strum(serialize = "No_DR")]
    #[serde(rename = "No_DR")]
    NoDr,
    Mild,
    Moderate,
    Severe,
    Proliferative,
}

impl Severity {
    /// Label at `index` in classifier output order.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }

    pub fn clinical_note(&self) -> &'static str {
        match self {
            Severity::NoDr => "No diabetic retinopathy detected. Annual screening recommended.",
            Severity::Mild => "Mild NPDR. Microaneurysms present. Follow-up in 6-12 months.",
            Severity::Moderate => "Moderate NPDR. Close monitoring needed. Follow-up in 3-6 months.",
            Severity::Severe => "Severe NPDR. High risk progression. Specialist referral within 1 month.",
            Severity::Proliferative => "PDR with neovascularization. Urgent specialist referral required.",
        }
    }
}

/// What a severity model returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SeverityOutput {
    /// Classification head, one probability per [`Severity`] label.
    Probabilities(Vec<f32>),
    /// Detection head, boxes whose class names are severity labels.
    Boxes(Vec<DetectionBox>),
}

pub trait SeverityClassifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> AnalysisResult<SeverityOutput>;
}

pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> AnalysisResult<Vec<DetectionBox>>;
}

/// Segmentation network. Returns 512x512 row-major logits.
pub trait VesselNetwork: Send + Sync {
    fn forward(&self, input: &ModelInput) -> AnalysisResult<Vec<f32>>;
}

/// A model that may or may not have been loaded.
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Default for Capability<T> {
    fn default() -> Self {
        Capability::Unavailable
    }
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Capability::Available(handle) => Some(handle),
            Capability::Unavailable => None,
        }
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Capability::Unavailable, Capability::Available)
    }
}

/// Every model the analyzer can use.
#[derive(Default)]
pub struct ModelSet {
    pub severity: Capability<Box<dyn SeverityClassifier>>,
    pub lesion: Capability<Box<dyn Detector>>,
    pub landmark: Capability<Box<dyn Detector>>,
    pub vessel: Capability<Box<dyn VesselNetwork>>,
}

impl ModelSet {
    pub fn log_status(&self) {
        let status = |available: bool| if available { "loaded" } else { "unavailable" };
        info!(
            severity = status(self.severity.is_available()),
            lesion = status(self.lesion.is_available()),
            landmark = status(self.landmark.is_available()),
            vessel = status(self.vessel.is_available()),
            "model status"
        );
    }
}

/// Detections recorded by an external inference run, replayed for every image.
#[derive(Debug, Clone)]
pub struct RecordedDetections(pub Vec<DetectionBox>);

impl Detector for RecordedDetections {
    fn detect(&self, _image: &RgbImage) -> AnalysisResult<Vec<DetectionBox>> {
        Ok(self.0.clone())
    }
}

/// Severity output recorded by an external inference run.
#[derive(Debug, Clone)]
pub struct RecordedSeverity(pub SeverityOutput);

impl SeverityClassifier for RecordedSeverity {
    fn classify(&self, _image: &RgbImage) -> AnalysisResult<SeverityOutput> {
        Ok(self.0.clone())
    }
}

/// JSON document holding the outputs of an external inference run.
///
/// ```json
/// {
///   "severity_probabilities": [0.1, 0.7, 0.1, 0.05, 0.05],
///   "lesions": [{"class_name": "hemorrhage", "confidence": 0.8, "box": [100, 100, 140, 140]}],
///   "landmarks": [{"class_name": "disc", "confidence": 0.9, "box": [400, 300, 500, 400]}]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFile {
    pub severity_probabilities: Option<Vec<f32>>,
    pub severity_boxes: Option<Vec<DetectionBox>>,
    pub lesions: Option<Vec<DetectionBox>>,
    pub landmarks: Option<Vec<DetectionBox>>,
}

impl DetectionFile {
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> AnalysisResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Turns each present section into an available model. The vessel
    /// network is never part of a recorded run.
    pub fn into_models(self) -> ModelSet {
        let severity = self
            .severity_probabilities
            .map(SeverityOutput::Probabilities)
            .or(self.severity_boxes.map(SeverityOutput::Boxes))
            .map(|output| Box::new(RecordedSeverity(output)) as Box<dyn SeverityClassifier>);
        let lesion = self
            .lesions
            .map(|boxes| Box::new(RecordedDetections(boxes)) as Box<dyn Detector>);
        let landmark = self
            .landmarks
            .map(|boxes| Box::new(RecordedDetections(boxes)) as Box<dyn Detector>);

        ModelSet {
            severity: severity.into(),
            lesion: lesion.into(),
            landmark: landmark.into(),
            vessel: Capability::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_labels_follow_classifier_order() {
        assert_eq!(Severity::from_index(0), Some(Severity::NoDr));
        assert_eq!(Severity::from_index(4), Some(Severity::Proliferative));
        assert_eq!(Severity::from_index(5), None);
        assert_eq!(Severity::NoDr.to_string(), "No_DR");
        assert_eq!("Moderate".parse::<Severity>().ok(), Some(Severity::Moderate));
    }

    #[test]
    fn detection_file_sections_become_capabilities() {
        let file = DetectionFile::from_json(
            r#"{"lesions": [{"class_name": "exudate", "confidence": 0.5, "box": [1, 2, 3, 4]}]}"#,
        )
        .expect("valid json");
        let models = file.into_models();
        assert!(models.lesion.is_available());
        assert!(!models.landmark.is_available());
        assert!(!models.severity.is_available());
        assert!(!models.vessel.is_available());
    }
}
