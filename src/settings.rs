//! User configuration for the extraction pipeline.
//!
//! The host persists this as a flat settings object and hands a fresh copy
//! to each request; nothing here is mutated mid-request.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

/// Prompt used when the user has not overridden it.
pub const DEFAULT_PROMPT: &str =
    "Extract all text from this image. Return only the extracted text, with no commentary.";

/// Endpoint and credentials for one backend family.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    /// Bearer key or API key. Empty for local backends.
    #[serde(default)]
    pub api_key: String,
    /// Base endpoint. Empty means the family's default.
    #[serde(default)]
    pub base_url: String,
    /// Model identifier, e.g. `gpt-4o-mini` or `llava`.
    #[serde(default)]
    pub model: String,
    /// Display name override for templates and notices.
    #[serde(default)]
    pub display_name: String,
}

/// The whole configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Which backend family handles requests.
    pub provider: ProviderKind,

    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub ollama: ProviderConfig,
    #[serde(default)]
    pub lmstudio: ProviderConfig,
    #[serde(default)]
    pub custom: ProviderConfig,

    /// Free-text prompt override; empty means [`DEFAULT_PROMPT`].
    #[serde(default)]
    pub prompt: String,

    /// Templates. All accept `{{token}}` syntax (see the template module).
    #[serde(default)]
    pub header_template: String,
    #[serde(default)]
    pub footer_template: String,
    #[serde(default)]
    pub batch_header_template: String,
    #[serde(default)]
    pub batch_footer_template: String,
    /// Per-image header/footer used inside a batch result.
    #[serde(default)]
    pub item_header_template: String,
    #[serde(default)]
    pub item_footer_template: String,

    /// When true, output goes to a note file instead of the cursor.
    #[serde(default)]
    pub output_to_note: bool,
    /// Folder template for note output. Empty means the vault root.
    #[serde(default)]
    pub note_folder_template: String,
    /// Filename template for note output (without `.md`).
    #[serde(default = "default_note_name_template")]
    pub note_name_template: String,
    /// When true, append to an existing note at the computed path instead of
    /// creating a uniquely named sibling.
    #[serde(default)]
    pub append_to_existing: bool,
}

fn default_note_name_template() -> String {
    "OCR {{YYYY-MM-DD HH-mm-ss}}".to_string()
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            openai: ProviderConfig::default(),
            gemini: ProviderConfig::default(),
            ollama: ProviderConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llava".to_string(),
                ..ProviderConfig::default()
            },
            // Left empty so the provider applies its own loopback default,
            // which carries the /v1 path segment.
            lmstudio: ProviderConfig::default(),
            custom: ProviderConfig::default(),
            prompt: String::new(),
            header_template: String::new(),
            footer_template: String::new(),
            batch_header_template: String::new(),
            batch_footer_template: String::new(),
            item_header_template: String::new(),
            item_footer_template: String::new(),
            output_to_note: false,
            note_folder_template: String::new(),
            note_name_template: default_note_name_template(),
            append_to_existing: false,
        }
    }
}

impl OcrSettings {
    /// Config block for the currently selected family.
    pub fn active_provider_config(&self) -> &ProviderConfig {
        match self.provider {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Ollama => &self.ollama,
            ProviderKind::LmStudio => &self.lmstudio,
            ProviderKind::Custom => &self.custom,
        }
    }

    /// The prompt actually sent: user override or the default.
    pub fn effective_prompt(&self) -> &str {
        if self.prompt.trim().is_empty() {
            DEFAULT_PROMPT
        } else {
            &self.prompt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let settings = OcrSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: OcrSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider, ProviderKind::OpenAi);
        assert_eq!(back.ollama.base_url, "http://localhost:11434");
        assert!(back.lmstudio.base_url.is_empty());
    }

    #[test]
    fn test_empty_prompt_falls_back_to_default() {
        let mut settings = OcrSettings::default();
        settings.prompt = "   ".to_string();
        assert_eq!(settings.effective_prompt(), DEFAULT_PROMPT);
        settings.prompt = "Describe the text".to_string();
        assert_eq!(settings.effective_prompt(), "Describe the text");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: OcrSettings = serde_json::from_str(r#"{"provider":"ollama"}"#).unwrap();
        assert_eq!(settings.provider, ProviderKind::Ollama);
        assert!(!settings.output_to_note);
        assert!(settings.note_name_template.contains("OCR "));
    }
}
