//! Short in-character replies from a plushie, produced by an external
//! chat-completion service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ChatConfig;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("OPENAI_API_KEY not configured")]
    NotConfigured,

    #[error("failed to call generation API: {0}")]
    Request(String),

    #[error("generation API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("no choices in response")]
    EmptyReply,

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Something that turns a prompt into a reply
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Build the single user prompt sent for a chat turn.
///
/// The past-conversation section is present whenever `history` is non-empty,
/// even if it holds only whitespace.
pub fn build_prompt(name: &str, kind: &str, history: &str) -> String {
    let mut prompt = format!("You are a plush {} named \"{}\".", kind, name);

    if !history.is_empty() {
        prompt.push_str("\n\nPast conversation:\n");
        prompt.push_str(history);
        prompt.push_str("\n\n");
    } else {
        prompt.push(' ');
    }

    prompt.push_str(
        "Speaking as this plushie, say one short line (one or two sentences). \
         Choose friendly, warm words.",
    );
    prompt
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// OpenAI-compatible chat completions client
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &ChatConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::NotConfigured)?;

        let request = CompletionRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, "Requesting chat completion");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "Chat completion failed");
            return Err(GenerationError::Status { status, body });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        extract_reply(body)
    }
}

fn extract_reply(body: CompletionResponse) -> Result<String, GenerationError> {
    body.choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or(GenerationError::EmptyReply)
}
