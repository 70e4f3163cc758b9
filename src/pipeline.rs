//! End-to-end orchestration: prepared images in, placed text out.
//!
//! One logical request runs as a single suspend-resume chain: provider call,
//! response classification, context building, formatting, routing, with no
//! parallel fan-out. Settings are snapshotted at construction and never
//! mutated mid-request.

use tracing::info;

use crate::batch::{run_batch, BatchOutcome};
use crate::context::{ModelInfo, OcrContext, ProviderInfo};
use crate::error::ExtractError;
use crate::host::{Editor, Vault};
use crate::image::PreparedImage;
use crate::output::{route, RoutedContent};
use crate::provider::{build_provider, VisionProvider};
use crate::settings::OcrSettings;
use crate::template::{compose_batch, compose_batch_items, compose_single, FormatTemplates};

/// One configured extraction pipeline.
pub struct OcrPipeline {
    settings: OcrSettings,
    provider: Box<dyn VisionProvider>,
}

impl OcrPipeline {
    /// Build a pipeline for the settings' selected provider.
    pub fn new(settings: OcrSettings, client: reqwest::Client) -> Self {
        let provider = build_provider(&settings, client);
        Self { settings, provider }
    }

    /// Inject an explicit provider (tests, host-supplied adapters).
    pub fn with_provider(settings: OcrSettings, provider: Box<dyn VisionProvider>) -> Self {
        Self { settings, provider }
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.provider.kind().as_str().to_string(),
            name: self.provider.display_name().to_string(),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.provider.model_id().to_string(),
            name: self.provider.model_id().to_string(),
        }
    }

    fn templates(&self) -> FormatTemplates {
        FormatTemplates {
            header: self.settings.header_template.clone(),
            footer: self.settings.footer_template.clone(),
            batch_header: self.settings.batch_header_template.clone(),
            batch_footer: self.settings.batch_footer_template.clone(),
            item_header: self.settings.item_header_template.clone(),
            item_footer: self.settings.item_footer_template.clone(),
        }
    }

    /// Run one request over one or more prepared images and place the result.
    pub async fn run(
        &self,
        images: &[PreparedImage],
        vault: &dyn Vault,
        editor: &mut dyn Editor,
    ) -> Result<(), ExtractError> {
        if images.is_empty() {
            return Err(ExtractError::NoText);
        }

        let prompt = self.settings.effective_prompt();
        info!(
            "running extraction: {} image(s) via {} ({})",
            images.len(),
            self.provider.display_name(),
            self.provider.model_id()
        );

        let outcome = run_batch(self.provider.as_ref(), images, prompt)
            .await?
            .ok_or(ExtractError::NoText)?;

        let templates = self.templates();
        match outcome {
            BatchOutcome::Single(text) => {
                // Exactly one logical result renders through the single-image
                // path, even when several images were submitted.
                let ctx =
                    OcrContext::single(self.provider_info(), self.model_info(), prompt, &images[0]);
                let content = compose_single(&templates, &ctx.to_value(), &text);
                route(
                    &self.settings,
                    &ctx,
                    &RoutedContent::Single(content),
                    vault,
                    editor,
                )
                .await
            }
            BatchOutcome::Batch(segments) => {
                let ctx =
                    OcrContext::batch(self.provider_info(), self.model_info(), prompt, images);
                let combined = compose_batch(&templates, &ctx, &segments);
                let per_image = compose_batch_items(&templates, &ctx, &segments);
                route(
                    &self.settings,
                    &ctx,
                    &RoutedContent::Batch {
                        combined,
                        per_image,
                    },
                    vault,
                    editor,
                )
                .await
            }
        }
    }

    /// Single-image convenience entry.
    pub async fn run_single(
        &self,
        image: &PreparedImage,
        vault: &dyn Vault,
        editor: &mut dyn Editor,
    ) -> Result<(), ExtractError> {
        self.run(std::slice::from_ref(image), vault, editor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BATCH_BEGIN_MARKER, BATCH_END_MARKER};
    use crate::host::{MemoryEditor, MemoryVault};
    use crate::provider::ProviderKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Provider that "receives" a wire response body and parses it the way
    /// the hosted family does, without a network.
    struct CannedProvider {
        response_body: String,
        batch: bool,
        calls: Arc<AtomicUsize>,
        last_image_count: Arc<AtomicUsize>,
    }

    impl CannedProvider {
        fn new(response_body: &str, batch: bool) -> Self {
            Self {
                response_body: response_body.to_string(),
                batch,
                calls: Arc::new(AtomicUsize::new(0)),
                last_image_count: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl VisionProvider for CannedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }
        fn display_name(&self) -> &str {
            "OpenAI"
        }
        fn model_id(&self) -> &str {
            "gpt-4o-mini"
        }
        fn supports_batch(&self) -> bool {
            self.batch
        }
        async fn process(
            &self,
            images: &[PreparedImage],
            _prompt: &str,
        ) -> Result<Option<String>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_image_count.store(images.len(), Ordering::SeqCst);
            let raw: serde_json::Value = serde_json::from_str(&self.response_body)
                .map_err(|_| ExtractError::MalformedResponse {
                    provider: "openai".to_string(),
                    payload: self.response_body.clone(),
                })?;
            Ok(crate::provider::finish_extraction(
                crate::provider::openai::extract_choice_text(&raw),
                &raw,
                "openai",
            ))
        }
    }

    fn image(name: &str) -> PreparedImage {
        PreparedImage::from_bytes(name, &[1, 2, 3], "inline")
    }

    fn pipeline(provider: CannedProvider, settings: OcrSettings) -> OcrPipeline {
        OcrPipeline::with_provider(settings, Box::new(provider))
    }

    #[tokio::test]
    async fn test_single_image_inline_end_to_end() {
        // Hosted-family response with padding; final inserted text is trimmed
        // and has no header/footer.
        let body = r#"{"choices":[{"message":{"content":" Hello World "}}]}"#;
        let p = pipeline(CannedProvider::new(body, true), OcrSettings::default());
        let vault = MemoryVault::new();
        let mut editor = MemoryEditor::new();

        p.run_single(&image("scan.png"), &vault, &mut editor)
            .await
            .unwrap();
        assert_eq!(editor.buffer(), "Hello World");
    }

    #[tokio::test]
    async fn test_batch_end_to_end_with_per_item_headers() {
        let content = format!(
            "{BATCH_BEGIN_MARKER}\nalpha\n{BATCH_END_MARKER}\n{BATCH_BEGIN_MARKER}\nbeta\n{BATCH_END_MARKER}"
        );
        let body = serde_json::json!({
            "choices": [{"message": {"content": content}}]
        })
        .to_string();
        let settings = OcrSettings {
            item_header_template: "## {{image.name}}".to_string(),
            ..OcrSettings::default()
        };
        let p = pipeline(CannedProvider::new(&body, true), settings);
        let vault = MemoryVault::new();
        let mut editor = MemoryEditor::new();

        p.run(&[image("a.png"), image("b.png")], &vault, &mut editor)
            .await
            .unwrap();
        assert_eq!(editor.buffer(), "## a\n\nalpha\n\n## b\n\nbeta");
    }

    #[tokio::test]
    async fn test_single_sentinel_pair_degrades_to_single_context() {
        // Two images submitted, one delimited block back: single-image
        // templates apply (header resolves against `image`, not `images`).
        let content =
            format!("{BATCH_BEGIN_MARKER}\nonly text\n{BATCH_END_MARKER}");
        let body = serde_json::json!({
            "choices": [{"message": {"content": content}}]
        })
        .to_string();
        let settings = OcrSettings {
            header_template: "# {{image.name}} ({{image.total}})".to_string(),
            ..OcrSettings::default()
        };
        let p = pipeline(CannedProvider::new(&body, true), settings);
        let vault = MemoryVault::new();
        let mut editor = MemoryEditor::new();

        p.run(&[image("a.png"), image("b.png")], &vault, &mut editor)
            .await
            .unwrap();
        assert_eq!(editor.buffer(), "# a (1)\n\nonly text");
    }

    #[tokio::test]
    async fn test_capability_gap_processes_first_image_only() {
        let body = r#"{"choices":[{"message":{"content":"from first"}}]}"#;
        let canned = CannedProvider::new(body, false);
        let calls = Arc::clone(&canned.calls);
        let seen = Arc::clone(&canned.last_image_count);
        let p = pipeline(canned, OcrSettings::default());
        let vault = MemoryVault::new();
        let mut editor = MemoryEditor::new();

        p.run(&[image("a.png"), image("b.png")], &vault, &mut editor)
            .await
            .unwrap();
        assert_eq!(editor.buffer(), "from first");
        // One provider call carrying only the first image, no per-image fan-out.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_choice_content_is_no_text() {
        // Install a subscriber so the warn/error paths actually format.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let body = r#"{"choices":[{"message":{"content":"   "}}]}"#;
        let p = pipeline(CannedProvider::new(body, true), OcrSettings::default());
        let vault = MemoryVault::new();
        let mut editor = MemoryEditor::new();

        let err = p
            .run_single(&image("a.png"), &vault, &mut editor)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoText));
        assert_eq!(editor.buffer(), "");
    }

    #[tokio::test]
    async fn test_no_images_is_no_text() {
        let body = r#"{"choices":[{"message":{"content":"x"}}]}"#;
        let p = pipeline(CannedProvider::new(body, true), OcrSettings::default());
        let vault = MemoryVault::new();
        let mut editor = MemoryEditor::new();
        assert!(matches!(
            p.run(&[], &vault, &mut editor).await.unwrap_err(),
            ExtractError::NoText
        ));
    }
}
