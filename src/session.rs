//! Per-image analysis state and the orchestrator that fills it.
//!
//! A session is created fresh for every loaded image, so no derived value can
//! leak from one image to the next. Stages return their results to the
//! [`Analyzer`], which is the only place where a failed stage is turned into
//! its fallback value.

use image::{GrayImage, RgbImage};
use serde::Serialize;
use tracing::{info, warn};

use crate::detection::{Capability, DetectionBox, Detector, ModelSet};
use crate::error::{AnalysisError, AnalysisResult};
use crate::geometry::{Calibration, PixelPoint};
use crate::processing::heatmap::{blend_heatmap, colorize_heat, lesion_heat};
use crate::processing::lesions::{LesionMeasurement, gallery_thumbnail, measure_lesion};
use crate::processing::render::{VesselView, draw_landmarks, draw_lesion_boxes};
use crate::processing::vessels::{self, VesselSegmentation, colorize, overlay};
use crate::report::{self, LesionDistanceRow};
use crate::selection::{Landmarks, SeverityAssessment, select_landmarks, select_lesions, select_severity};
use crate::settings::VesselSettings;

/// Which layers the display image shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayToggles {
    pub show_heatmap: bool,
    pub show_lesion_boxes: bool,
    pub show_macula_disc: bool,
    pub vessel_view: VesselView,
}

impl Default for DisplayToggles {
    fn default() -> Self {
        Self {
            show_heatmap: false,
            show_lesion_boxes: true,
            show_macula_disc: true,
            vessel_view: VesselView::Off,
        }
    }
}

/// Everything derived from one fundus image.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    pub image: RgbImage,
    pub severity: SeverityAssessment,
    pub lesions: Vec<DetectionBox>,
    pub landmarks: Landmarks,
    /// `None` when vessel analysis is unavailable, which is not the same as an empty mask.
    pub vessels: Option<VesselSegmentation>,
    pub calibration: Calibration,
    pub heat: GrayImage,
    pub display: DisplayToggles,
}

/// One entry of the lesion gallery.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    /// Position of the lesion in detector order.
    pub index: usize,
    pub lesion: DetectionBox,
    pub measurement: LesionMeasurement,
    pub thumbnail: RgbImage,
}

impl AnalysisSession {
    /// Fresh state for a newly loaded image, with every derived value cleared.
    pub fn new(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            severity: SeverityAssessment::default(),
            lesions: Vec::new(),
            landmarks: Landmarks::default(),
            vessels: None,
            calibration: Calibration::from_image_width(width),
            heat: GrayImage::new(width, height),
            display: DisplayToggles::default(),
            image,
        }
    }

    pub fn macula_center(&self) -> Option<PixelPoint> {
        self.landmarks.macula_center()
    }

    pub fn disc_center(&self) -> Option<PixelPoint> {
        self.landmarks.disc_center()
    }

    pub fn disc_diameter_px(&self) -> u32 {
        self.landmarks.disc_diameter_px
    }

    /// Density of the current mask, 0 when there is none.
    pub fn vessel_density(&self) -> f64 {
        self.vessels.as_ref().map_or(0.0, |v| v.density)
    }

    pub fn toggle_heatmap(&mut self) {
        self.display.show_heatmap = !self.display.show_heatmap;
    }

    pub fn toggle_lesion_boxes(&mut self) {
        self.display.show_lesion_boxes = !self.display.show_lesion_boxes;
    }

    pub fn toggle_macula_disc(&mut self) {
        self.display.show_macula_disc = !self.display.show_macula_disc;
    }

    pub fn cycle_vessel_view(&mut self) -> VesselView {
        self.display.vessel_view = self.display.vessel_view.next();
        self.display.vessel_view
    }

    pub fn lesion_distances(&self) -> Vec<LesionDistanceRow> {
        report::lesion_distances(&self.lesions, &self.landmarks)
    }

    pub fn lesion_summary(&self) -> String {
        report::lesion_summary(&self.lesions, &self.landmarks)
    }

    /// Image for the current toggles. Vessel views need a mask and fall back
    /// to the annotated image without one.
    pub fn display_image(&self, settings: &VesselSettings) -> RgbImage {
        match (self.display.vessel_view, &self.vessels) {
            (VesselView::VesselsOnly, Some(vessels)) => colorize(&vessels.mask, settings.color()),
            (VesselView::Overlay, Some(vessels)) => {
                overlay(&self.image, &vessels.mask, settings.color(), settings.overlay_opacity)
            }
            _ => self.annotated_image(),
        }
    }

    /// Original image with the enabled box layers and the heatmap.
    pub fn annotated_image(&self) -> RgbImage {
        let mut canvas = self.image.clone();
        if self.display.show_lesion_boxes {
            draw_lesion_boxes(&mut canvas, &self.lesions);
        }
        if self.display.show_macula_disc {
            draw_landmarks(&mut canvas, &self.landmarks);
        }
        if self.display.show_heatmap {
            canvas = blend_heatmap(&canvas, &colorize_heat(&self.heat));
        }
        canvas
    }

    /// Measures every lesion. Lesions that cannot be cropped are skipped.
    pub fn lesion_gallery(&self) -> Vec<GalleryEntry> {
        self.lesions
            .iter()
            .enumerate()
            .filter_map(|(index, lesion)| match measure_lesion(&self.image, lesion, &self.calibration) {
                Ok(measurement) => Some(GalleryEntry {
                    index,
                    lesion: lesion.clone(),
                    thumbnail: gallery_thumbnail(&measurement),
                    measurement,
                }),
                Err(e) => {
                    warn!(index, class = %lesion.class_name, "lesion measurement skipped: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Runs every stage over an image and commits the results to a session.
pub struct Analyzer {
    models: ModelSet,
    settings: VesselSettings,
}

impl Analyzer {
    pub fn new(models: ModelSet, settings: VesselSettings) -> Self {
        models.log_status();
        Self { models, settings }
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub fn settings(&self) -> &VesselSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut VesselSettings {
        &mut self.settings
    }

    /// Restores default settings, preferring the network only when it is loaded.
    pub fn reset_settings(&mut self) {
        self.settings.reset(self.models.vessel.is_available());
    }

    pub fn analyze(&self, image: RgbImage) -> AnalysisSession {
        let mut session = AnalysisSession::new(image);
        let (width, height) = session.image.dimensions();

        session.severity = self.classify_severity(&session.image);
        session.lesions = self.detect_lesions(&session.image);
        session.landmarks = self.detect_landmarks(&session.image);
        session.calibration = Calibration::resolve(session.landmarks.disc_diameter_px, width);
        session.heat = lesion_heat(width, height, &session.lesions);
        session.vessels = self.segment_vessels(&session.image);

        info!(
            severity = %session.severity.severity,
            confidence = session.severity.confidence,
            lesions = session.lesions.len(),
            disc_diameter_px = session.landmarks.disc_diameter_px,
            vessel_density = session.vessel_density(),
            "analysis finished"
        );
        session
    }

    /// Re-runs vessel segmentation after a settings change.
    pub fn resegment_vessels(&self, session: &mut AnalysisSession) {
        session.vessels = self.segment_vessels(&session.image);
    }

    pub fn report(&self, session: &AnalysisSession) -> String {
        report::generate_report(session, self.settings.threshold)
    }

    fn classify_severity(&self, image: &RgbImage) -> SeverityAssessment {
        match &self.models.severity {
            Capability::Available(model) => match model.classify(image) {
                Ok(output) => select_severity(Some(&output)),
                Err(e) => {
                    warn!("severity classification failed: {e}");
                    SeverityAssessment::default()
                }
            },
            Capability::Unavailable => select_severity(None),
        }
    }

    fn detect_lesions(&self, image: &RgbImage) -> Vec<DetectionBox> {
        or_fallback("lesion detection", run_detector(&self.models.lesion, "lesion", image).map(select_lesions))
    }

    fn detect_landmarks(&self, image: &RgbImage) -> Landmarks {
        or_fallback(
            "macula/disc detection",
            run_detector(&self.models.landmark, "landmark", image).map(|boxes| select_landmarks(&boxes)),
        )
    }

    fn segment_vessels(&self, image: &RgbImage) -> Option<VesselSegmentation> {
        let network = self.models.vessel.available().map(Box::as_ref);
        match vessels::segment(image, network, &self.settings) {
            Ok(segmentation) => Some(segmentation),
            Err(e) => {
                warn!("vessel segmentation failed: {e}");
                None
            }
        }
    }
}

fn run_detector(
    model: &Capability<Box<dyn Detector>>,
    name: &'static str,
    image: &RgbImage,
) -> AnalysisResult<Vec<DetectionBox>> {
    match model {
        Capability::Available(detector) => detector.detect(image),
        Capability::Unavailable => Err(AnalysisError::ModelUnavailable(name)),
    }
}

/// Logs a failed stage and substitutes its empty result. A missing model is
/// expected and only logged at info level.
fn or_fallback<T: Default>(stage: &str, result: AnalysisResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(AnalysisError::ModelUnavailable(model)) => {
            info!("{stage} skipped, {model} model unavailable");
            T::default()
        }
        Err(e) => {
            warn!("{stage} failed: {e}");
            T::default()
        }
    }
}
