//! Error taxonomy shared by every analysis stage.
//!
//! Stages return these errors; only the orchestrator decides which sentinel
//! a failed stage degrades to.

use kornia::image::ImageError as KorniaImageError;

/// Errors that can occur while analysing a fundus photograph.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(&'static str),

    #[error("computation failed: {0}")]
    Computation(String),

    #[error("calibration factor is undefined")]
    CalibrationUndefined,

    #[error("invalid vessel settings: {0}")]
    InvalidSettings(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("kornia image error: {0}")]
    Kornia(#[from] KorniaImageError),

    #[error("detection file error: {0}")]
    DetectionFile(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub(crate) fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Failures of the remote narration service. None of them touch analysis state.
#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    #[error("narration service is not configured")]
    NotConfigured,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("narration service returned status {0}")]
    Status(u16),

    #[error("narration service returned no content")]
    EmptyResponse,

    #[error("request superseded by a newer one")]
    Superseded,
}
