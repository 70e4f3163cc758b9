//! OpenAI-compatible servers: the LM Studio loopback default and arbitrary
//! user-supplied endpoints. Same wire shape as the hosted family, plus a
//! system turn; the bearer key is optional and an empty key sends no
//! Authorization header at all.

use serde::Serialize;
use tracing::debug;

use super::openai::{extract_choice_text, user_content, ContentPart};
use super::{finish_extraction, post_json, ProviderKind, RequestParts, VisionProvider};
use crate::error::ExtractError;
use crate::image::PreparedImage;
use crate::settings::ProviderConfig;

const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";
const MAX_TOKENS: u32 = 4096;

const SYSTEM_PROMPT: &str =
    "You are an OCR assistant. Extract text from the provided images exactly as instructed.";

pub struct OpenAiCompatProvider {
    kind: ProviderKind,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    display_name: String,
}

impl OpenAiCompatProvider {
    pub fn new(kind: ProviderKind, client: reqwest::Client, cfg: &ProviderConfig) -> Self {
        let pick = |value: &str, default: &str| {
            if value.trim().is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        let default_url = match kind {
            ProviderKind::LmStudio => LMSTUDIO_BASE_URL,
            _ => "",
        };
        Self {
            kind,
            client,
            api_key: cfg.api_key.clone(),
            base_url: pick(&cfg.base_url, default_url),
            model: cfg.model.clone(),
            display_name: pick(&cfg.display_name, kind.default_display_name()),
        }
    }

    fn build_request(&self, images: &[PreparedImage], prompt: &str) -> RequestParts {
        let key = self.api_key.trim();
        RequestParts {
            url: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            bearer: if key.is_empty() {
                None
            } else {
                Some(key.to_string())
            },
            body: serde_json::to_value(ChatRequest {
                model: self.model.clone(),
                messages: vec![
                    Message::System {
                        content: SYSTEM_PROMPT,
                    },
                    Message::User {
                        content: user_content(images, prompt),
                    },
                ],
                max_tokens: MAX_TOKENS,
            })
            .unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl VisionProvider for OpenAiCompatProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
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
        let label = self.kind.as_str();
        debug!(
            "OpenAiCompatProvider({}): {} image(s), model={}",
            label,
            images.len(),
            self.model
        );
        let parts = self.build_request(images, prompt);
        let Some(raw) = post_json(&self.client, parts, label).await? else {
            return Ok(None);
        };
        // Same response shape as the hosted chat-completions family.
        Ok(finish_extraction(extract_choice_text(&raw), &raw, label))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message {
    System { content: &'static str },
    User { content: Vec<ContentPart> },
}
