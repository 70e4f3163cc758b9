//! Modular vision-model provider abstraction.
//!
//! Defines the [`VisionProvider`] trait and the tagged family registry so
//! different OCR-capable backends (hosted chat-completions APIs, Gemini,
//! local Ollama, OpenAI-compatible local servers) can be swapped via
//! configuration.
//!
//! Error contract shared by every family: transport failures, non-2xx
//! statuses, and responses that parse as JSON but fail the family's
//! structural predicate all log a diagnostic and surface as `Ok(None)`.
//! Only a body that is not JSON at all crosses the boundary, as
//! [`ExtractError::MalformedResponse`].

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod openai_compat;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::ExtractError;
use crate::image::PreparedImage;
use crate::settings::OcrSettings;

/// Backend family identifiers used for registry lookup and templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Ollama,
    LmStudio,
    Custom,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::LmStudio => "lmstudio",
            Self::Custom => "custom",
        }
    }

    /// Parse a settings string into a provider kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            "ollama" => Some(Self::Ollama),
            "lmstudio" => Some(Self::LmStudio),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Default display name when the user has not overridden it.
    pub fn default_display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
            Self::Ollama => "Ollama",
            Self::LmStudio => "LM Studio",
            Self::Custom => "Custom endpoint",
        }
    }
}

/// Async trait implemented by each backend family.
#[async_trait::async_trait]
pub trait VisionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn display_name(&self) -> &str;
    fn model_id(&self) -> &str;

    /// Whether this family can take several images in one call.
    fn supports_batch(&self) -> bool;

    /// Send `images` with `prompt`, returning trimmed extracted text.
    /// `Ok(None)` means the call settled but produced nothing usable.
    async fn process(
        &self,
        images: &[PreparedImage],
        prompt: &str,
    ) -> Result<Option<String>, ExtractError>;

    /// Single-image path; every family supports this.
    async fn extract_single(
        &self,
        image: &PreparedImage,
        prompt: &str,
    ) -> Result<Option<String>, ExtractError> {
        self.process(std::slice::from_ref(image), prompt).await
    }
}

/// Build the provider the settings currently select.
pub fn build_provider(settings: &OcrSettings, client: reqwest::Client) -> Box<dyn VisionProvider> {
    let cfg = settings.active_provider_config();
    match settings.provider {
        ProviderKind::OpenAi => Box::new(openai::OpenAiProvider::new(client, cfg)),
        ProviderKind::Gemini => Box::new(gemini::GeminiProvider::new(client, cfg)),
        ProviderKind::Ollama => Box::new(ollama::OllamaProvider::new(client, cfg)),
        ProviderKind::LmStudio | ProviderKind::Custom => Box::new(
            openai_compat::OpenAiCompatProvider::new(settings.provider, client, cfg),
        ),
    }
}

// ============================================================================
// Shared dispatch
// ============================================================================

/// A fully shaped request, kept as plain data so wire shaping is testable
/// without a network.
#[derive(Debug)]
pub(crate) struct RequestParts {
    pub url: String,
    /// Bearer token; `None` means no Authorization header is sent at all.
    pub bearer: Option<String>,
    pub body: serde_json::Value,
}

/// POST the request and return the response JSON.
///
/// Transport errors and non-2xx statuses log and yield `Ok(None)`; a body
/// that is not JSON yields the typed [`ExtractError::MalformedResponse`].
pub(crate) async fn post_json(
    client: &reqwest::Client,
    parts: RequestParts,
    label: &str,
) -> Result<Option<serde_json::Value>, ExtractError> {
    let mut request = client.post(&parts.url).json(&parts.body);
    if let Some(token) = &parts.bearer {
        request = request.bearer_auth(token);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            error!("{}: request failed: {}", label, e);
            return Ok(None);
        }
    };

    let status = response.status();
    let text = match response.text().await {
        Ok(t) => t,
        Err(e) => {
            error!("{}: failed to read response body: {}", label, e);
            return Ok(None);
        }
    };

    if !status.is_success() {
        error!(
            "{}: API error ({}): {}",
            label,
            status,
            truncate_for_log(&text)
        );
        return Ok(None);
    }

    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            error!("{}: response is not JSON: {}", label, e);
            Err(ExtractError::MalformedResponse {
                provider: label.to_string(),
                payload: text,
            })
        }
    }
}

/// Apply a family's extraction to a response value, logging the raw payload
/// when the structural predicate fails. An empty-after-trim extraction also
/// maps to `None`.
pub(crate) fn finish_extraction(
    extracted: Option<String>,
    raw: &serde_json::Value,
    label: &str,
) -> Option<String> {
    match extracted {
        Some(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                warn!("{}: response contained only empty text", label);
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => {
            let payload = raw.to_string();
            error!(
                "{}: response shape did not match, payload: {}",
                label,
                truncate_for_log(&payload)
            );
            None
        }
    }
}

/// Cap diagnostic payloads at 500 bytes without splitting a UTF-8 sequence.
pub(crate) fn truncate_for_log(text: &str) -> &str {
    const LIMIT: usize = 500;
    if text.len() <= LIMIT {
        return text;
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trips_through_strings() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Gemini,
            ProviderKind::Ollama,
            ProviderKind::LmStudio,
            ProviderKind::Custom,
        ] {
            assert_eq!(ProviderKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::from_str("unknown"), None);
    }

    #[test]
    fn test_kind_serde_matches_as_str() {
        let json = serde_json::to_string(&ProviderKind::LmStudio).unwrap();
        assert_eq!(json, "\"lmstudio\"");
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let short = "abc";
        assert_eq!(truncate_for_log(short), "abc");

        // Byte 500 lands inside a multi-byte sequence; the cut walks back
        // to the last boundary instead of panicking.
        let mut long = "x".repeat(498);
        long.push_str("日本語テキスト");
        let truncated = truncate_for_log(&long);
        assert_eq!(truncated.len(), 498);
        assert!(truncated.chars().all(|c| c == 'x'));
    }

    #[test]
    fn test_finish_extraction_logs_multibyte_payload_without_panic() {
        // An active subscriber forces the error! arguments to be formatted.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        // Serialized as {"detail":"..."} the CJK run straddles byte 500.
        let mut body = "x".repeat(487);
        body.push_str("日本語テキスト");
        let raw = json!({ "detail": body });
        assert_eq!(finish_extraction(None, &raw, "t"), None);
    }

    #[test]
    fn test_finish_extraction_trims() {
        let raw = json!({});
        assert_eq!(
            finish_extraction(Some("  Hello World  ".to_string()), &raw, "t"),
            Some("Hello World".to_string())
        );
        assert_eq!(finish_extraction(Some("   ".to_string()), &raw, "t"), None);
        assert_eq!(finish_extraction(None, &raw, "t"), None);
    }
}
