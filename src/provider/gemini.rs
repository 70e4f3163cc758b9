//! Gemini family: inline binary parts, API key as a URL query parameter.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{finish_extraction, post_json, ProviderKind, RequestParts, VisionProvider};
use crate::error::ExtractError;
use crate::image::PreparedImage;
use crate::settings::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    display_name: String,
}

impl GeminiProvider {
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
            api_key: cfg.api_key.clone(),
            base_url: pick(&cfg.base_url, DEFAULT_BASE_URL),
            model: pick(&cfg.model, DEFAULT_MODEL),
            display_name: pick(
                &cfg.display_name,
                ProviderKind::Gemini.default_display_name(),
            ),
        }
    }

    /// Key travels in the query string; the request carries no auth header.
    fn build_request(&self, images: &[PreparedImage], prompt: &str) -> RequestParts {
        let mut parts: Vec<Part> = images
            .iter()
            .map(|img| Part::InlineData {
                inline_data: InlineData {
                    mime_type: img.mime.clone(),
                    data: img.base64.clone(),
                },
            })
            .collect();
        parts.push(Part::Text {
            text: prompt.to_string(),
        });

        RequestParts {
            url: format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url.trim_end_matches('/'),
                self.model,
                self.api_key
            ),
            bearer: None,
            body: serde_json::to_value(GenerateRequest {
                contents: vec![Content {
                    role: "user",
                    parts,
                }],
            })
            .unwrap_or_default(),
        }
    }
}

/// First candidate's first text part.
pub(crate) fn extract_candidate_text(raw: &serde_json::Value) -> Option<String> {
    let response: GenerateResponse = serde_json::from_value(raw.clone()).ok()?;
    response
        .candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .find_map(|p| p.text)
}

#[async_trait::async_trait]
impl VisionProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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
            "GeminiProvider: {} image(s), model={}",
            images.len(),
            self.model
        );
        let parts = self.build_request(images, prompt);
        let Some(raw) = post_json(&self.client, parts, "gemini").await? else {
            return Ok(None);
        };
        Ok(finish_extraction(
            extract_candidate_text(&raw),
            &raw,
            "gemini",
        ))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    InlineData { inline_data: InlineData },
    Text { text: String },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(
            reqwest::Client::new(),
            &ProviderConfig {
                api_key: "g-key".to_string(),
                ..ProviderConfig::default()
            },
        )
    }

    fn image(name: &str) -> PreparedImage {
        PreparedImage::from_bytes(name, &[9, 9], "inline")
    }

    #[test]
    fn test_key_in_query_not_header() {
        let parts = provider().build_request(&[image("a.png")], "Extract");
        assert!(parts.url.ends_with("generateContent?key=g-key"));
        assert!(parts.bearer.is_none());
    }

    #[test]
    fn test_request_shape_inline_data_then_text() {
        let parts = provider().build_request(&[image("a.png"), image("b.png")], "Extract");
        let body_parts = parts.body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(body_parts.len(), 3);
        assert_eq!(body_parts[0]["inline_data"]["mime_type"], "image/png");
        // Inline data is raw base64, never a data URI.
        assert!(!body_parts[0]["inline_data"]["data"]
            .as_str()
            .unwrap()
            .starts_with("data:"));
        assert_eq!(body_parts[2]["text"], "Extract");
    }

    #[test]
    fn test_extract_first_candidate_first_text_part() {
        let raw = json!({
            "candidates": [
                {"content": {"parts": [{"text": "result one"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        });
        assert_eq!(extract_candidate_text(&raw), Some("result one".to_string()));
    }

    #[test]
    fn test_predicate_rejects_wrong_shape() {
        assert_eq!(extract_candidate_text(&json!({"candidates": []})), None);
        assert_eq!(extract_candidate_text(&json!({"choices": [{}]})), None);
    }
}
