use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatClient, ChatMessage, NarrationError};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "arcee-ai/trinity-mini:free";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
const PLACEHOLDER_KEYS: [&str; 2] = ["your-api-key-here", "ur api key here"];
const SYSTEM_PROMPT: &str = "You are RetinaExpert, an ophthalmology AI assistant specializing in \
                             diabetic retinopathy and retinal analysis.";

/// Where and how to reach the chat completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: OPENROUTER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ChatConfig {
    /// Defaults with the key taken from `OPENROUTER_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_VAR).ok(),
            ..Self::default()
        }
    }

    /// A usable key: present, non-empty and not a placeholder.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !PLACEHOLDER_KEYS.contains(key))
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Chat client for OpenRouter's OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    config: ChatConfig,
    http: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

impl ChatClient for OpenRouterClient {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn complete(&self, mut messages: Vec<ChatMessage>, max_tokens: u32) -> Result<String, NarrationError> {
        let api_key = self.config.api_key().ok_or(NarrationError::NotConfigured)?;
        if !messages.iter().any(|m| m.role == "system") {
            messages.insert(0, ChatMessage::system(self.config.system_prompt.clone()));
        }

        let body = CompletionRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens,
        };
        debug!(model = %self.config.model, max_tokens, "sending chat completion");
        let response = self.http.post(&self.config.url).bearer_auth(api_key).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "chat completion rejected");
            return Err(NarrationError::Status(status.as_u16()));
        }
        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(NarrationError::EmptyResponse)
    }
}
