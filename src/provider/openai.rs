//! Hosted chat-completions family (OpenAI and API-compatible hosted services
//! such as OpenRouter, selected via `base_url`).

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{finish_extraction, post_json, ProviderKind, RequestParts, VisionProvider};
use crate::error::ExtractError;
use crate::image::PreparedImage;
use crate::settings::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 4096;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    display_name: String,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, cfg: &ProviderConfig) -> Self {
        Self {
            client,
            api_key: cfg.api_key.clone(),
            base_url: non_empty_or(&cfg.base_url, DEFAULT_BASE_URL),
            model: non_empty_or(&cfg.model, DEFAULT_MODEL),
            display_name: non_empty_or(
                &cfg.display_name,
                ProviderKind::OpenAi.default_display_name(),
            ),
        }
    }

    fn build_request(&self, images: &[PreparedImage], prompt: &str) -> RequestParts {
        RequestParts {
            url: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            bearer: Some(self.api_key.clone()),
            body: serde_json::to_value(ChatRequest {
                model: self.model.clone(),
                messages: vec![Message {
                    role: "user",
                    content: user_content(images, prompt),
                }],
                max_tokens: MAX_TOKENS,
            })
            .unwrap_or_default(),
        }
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// One image-url block per image, then the prompt as a trailing text block.
pub(crate) fn user_content(images: &[PreparedImage], prompt: &str) -> Vec<ContentPart> {
    let mut parts: Vec<ContentPart> = images
        .iter()
        .map(|img| ContentPart::ImageUrl {
            image_url: ImageUrl { url: img.data_uri() },
        })
        .collect();
    parts.push(ContentPart::Text {
        text: prompt.to_string(),
    });
    parts
}

/// Structural predicate and extraction for the chat-completions shape:
/// a `choices` array whose first entry has `message.content`.
pub(crate) fn extract_choice_text(raw: &serde_json::Value) -> Option<String> {
    let response: ChatResponse = serde_json::from_value(raw.clone()).ok()?;
    response.choices.into_iter().next()?.message.content
}

#[async_trait::async_trait]
impl VisionProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn process(
        &self,
        images: &[PreparedImage],
        prompt: &str,
    ) -> Result<Option<String>, ExtractError> {
        debug!(
            "OpenAiProvider: {} image(s), model={}",
            images.len(),
            self.model
        );
        let parts = self.build_request(images, prompt);
        let Some(raw) = post_json(&self.client, parts, "openai").await? else {
            return Ok(None);
        };
        Ok(finish_extraction(extract_choice_text(&raw), &raw, "openai"))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
