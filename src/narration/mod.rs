//! Natural-language narration of a finished analysis.
//!
//! The core only builds a [`ScanContext`] and the prompts around it. Text
//! generation is delegated to a [`ChatClient`]; [`Narrator`] runs it off the
//! analysis path and reports results over a channel.

mod dispatcher;
mod openrouter;
mod prompt;

use std::future::Future;

use serde::{Deserialize, Serialize};

pub use crate::error::NarrationError;
pub use dispatcher::{NarrationEvent, Narrator, RequestId};
pub use openrouter::{ChatConfig, OpenRouterClient};
pub use prompt::{ASSESSMENT_MAX_TOKENS, QUESTION_MAX_TOKENS, assessment_prompt, question_prompt};

use crate::report::lesion_counts;
use crate::session::AnalysisSession;

/// Analysis facts handed to the narration service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanContext {
    pub severity: String,
    pub confidence: f32,
    pub lesion_count: usize,
    /// Per-class counts in order of first appearance.
    pub lesion_types: Vec<(String, usize)>,
    pub vessel_density: f64,
    pub vessel_method: String,
    pub optic_disc_diameter: u32,
}

impl ScanContext {
    pub fn from_session(session: &AnalysisSession) -> Self {
        let vessel_method = session
            .vessels
            .as_ref()
            .map_or("Unavailable", |v| v.method.short_label());
        Self {
            severity: session.severity.severity.to_string(),
            confidence: session.severity.confidence,
            lesion_count: session.lesions.len(),
            lesion_types: lesion_counts(&session.lesions),
            vessel_density: session.vessel_density(),
            vessel_method: vessel_method.to_string(),
            optic_disc_diameter: session.disc_diameter_px(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// What to ask the narration service.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationRequest {
    Assessment(ScanContext),
    Question { context: ScanContext, question: String },
}

impl NarrationRequest {
    pub fn messages(&self) -> Vec<ChatMessage> {
        let prompt = match self {
            NarrationRequest::Assessment(context) => assessment_prompt(context),
            NarrationRequest::Question { context, question } => question_prompt(context, question),
        };
        vec![ChatMessage::user(prompt)]
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            NarrationRequest::Assessment(_) => ASSESSMENT_MAX_TOKENS,
            NarrationRequest::Question { .. } => QUESTION_MAX_TOKENS,
        }
    }
}

/// Remote text generation.
pub trait ChatClient: Send + Sync + 'static {
    fn is_configured(&self) -> bool {
        true
    }

    fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> impl Future<Output = Result<String, NarrationError>> + Send;
}
