//! Post-inference analysis of retinal fundus photographs.
//!
//! Raw model outputs (severity probabilities, lesion and landmark boxes,
//! vessel probability maps) go in; measurements, overlays and a clinical text
//! report come out. Model inference itself is consumed through the traits in
//! [`detection`].

pub mod detection;
pub mod error;
pub mod geometry;
pub mod narration;
pub mod processing;
pub mod report;
pub mod selection;
pub mod session;
pub mod settings;

pub use detection::{Capability, DetectionBox, ModelSet, Severity};
pub use error::{AnalysisError, AnalysisResult};
pub use session::{AnalysisSession, Analyzer};
pub use settings::VesselSettings;
