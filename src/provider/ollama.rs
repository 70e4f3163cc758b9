//! Local Ollama server: raw base64 images, streaming explicitly disabled so
//! the response parses as one JSON object. No auth header, ever.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{finish_extraction, post_json, ProviderKind, RequestParts, VisionProvider};
use crate::error::ExtractError;
use crate::image::PreparedImage;
use crate::settings::ProviderConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llava";
const MAX_TOKENS: u32 = 4096;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    display_name: String,
}

impl OllamaProvider {
    pub fn new(client: reqwest::Client, cfg: &ProviderConfig) -> Self {
        let pick = |value: &str, default: &str| {
            if value.trim().is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        Self {
            client,
            base_url: pick(&cfg.base_url, DEFAULT_BASE_URL),
            model: pick(&cfg.model, DEFAULT_MODEL),
            display_name: pick(
                &cfg.display_name,
                ProviderKind::Ollama.default_display_name(),
            ),
        }
    }

    fn build_request(&self, images: &[PreparedImage], prompt: &str) -> RequestParts {
        RequestParts {
            url: format!("{}/api/chat", self.base_url.trim_end_matches('/')),
            // Loopback server expects no Authorization header.
            bearer: None,
            body: serde_json::to_value(ChatRequest {
                model: self.model.clone(),
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                    // Raw base64, no data-URI prefix, no per-image mime.
                    images: images.iter().map(|img| img.base64.clone()).collect(),
                }],
                max_tokens: MAX_TOKENS,
                stream: false,
            })
            .unwrap_or_default(),
        }
    }
}

/// Predicate: a `message` object with a string `content`.
pub(crate) fn extract_message_content(raw: &serde_json::Value) -> Option<String> {
    let response: ChatResponse = serde_json::from_value(raw.clone()).ok()?;
    Some(response.message.content)
}

#[async_trait::async_trait]
impl VisionProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    /// The single-prompt wire format gives the model no per-image structure
    /// to anchor the sentinel protocol on, so batch is not offered.
    fn supports_batch(&self) -> bool {
        false
    }

    async fn process(
        &self,
        images: &[PreparedImage],
        prompt: &str,
    ) -> Result<Option<String>, ExtractError> {
        debug!(
            "OllamaProvider: {} image(s), model={}",
            images.len(),
            self.model
        );
        let parts = self.build_request(images, prompt);
        let Some(raw) = post_json(&self.client, parts, "ollama").await? else {
            return Ok(None);
        };
        Ok(finish_extraction(
            extract_message_content(&raw),
            &raw,
            "ollama",
        ))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    images: Vec<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OllamaProvider {
        OllamaProvider::new(reqwest::Client::new(), &ProviderConfig::default())
    }

    #[test]
    fn test_no_auth_header_for_local_backend() {
        let img = PreparedImage::from_bytes("a.png", &[1], "inline");
        let parts = provider().build_request(&[img], "Extract");
        assert!(parts.bearer.is_none());
        assert_eq!(parts.url, "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_request_shape_raw_base64_stream_disabled() {
        let img = PreparedImage::from_bytes("a.png", &[1, 2], "inline");
        let parts = provider().build_request(&[img.clone()], "Extract");
        assert_eq!(parts.body["stream"], false);
        let wire_images = parts.body["messages"][0]["images"].as_array().unwrap();
        assert_eq!(wire_images[0], img.base64);
        assert!(!wire_images[0].as_str().unwrap().starts_with("data:"));
        assert_eq!(parts.body["messages"][0]["content"], "Extract");
    }

    #[test]
    fn test_extract_message_content() {
        let raw = json!({"message": {"content": "some text"}});
        assert_eq!(extract_message_content(&raw), Some("some text".to_string()));
        assert_eq!(extract_message_content(&json!({"choices": []})), None);
    }

    #[test]
    fn test_batch_not_supported() {
        assert!(!provider().supports_batch());
    }
}
