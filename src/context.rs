//! Metadata snapshot handed to the template engine.
//!
//! The single/batch distinction is carried purely by shape: a context has
//! either an `image` object or an `images` array, never both and never a
//! separate mode flag. Templates and the output router key off that shape.

use serde::Serialize;

use crate::image::PreparedImage;

/// Identity of the backend that produced a result.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
}

/// Identity of the model used.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// Per-image metadata visible to templates.
#[derive(Debug, Clone, Serialize)]
pub struct ImageMeta {
    pub filename: String,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub source: String,
    /// 1-based position within the request.
    pub index: usize,
    pub total: usize,
}

impl ImageMeta {
    fn from_prepared(img: &PreparedImage, index: usize, total: usize) -> Self {
        Self {
            filename: img.name.clone(),
            size: img.size,
            width: img.width,
            height: img.height,
            source: img.source.clone(),
            index,
            total,
        }
    }
}

/// Everything the template engine can see about one request.
#[derive(Debug, Clone, Serialize)]
pub struct OcrContext {
    pub provider: ProviderInfo,
    pub model: ModelInfo,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageMeta>>,
}

impl OcrContext {
    /// Single-image context: `image` populated with `index=1, total=1`.
    pub fn single(
        provider: ProviderInfo,
        model: ModelInfo,
        prompt: &str,
        image: &PreparedImage,
    ) -> Self {
        Self {
            provider,
            model,
            prompt: prompt.to_string(),
            image: Some(ImageMeta::from_prepared(image, 1, 1)),
            images: None,
        }
    }

    /// Batch context: `images` populated with 1-based `index`/`total`.
    ///
    /// A one-element input collapses to a single-image context, mirroring the
    /// batch orchestrator's match-count policy: exactly one logical result
    /// always renders through the single-image templates.
    pub fn batch(
        provider: ProviderInfo,
        model: ModelInfo,
        prompt: &str,
        images: &[PreparedImage],
    ) -> Self {
        if images.len() == 1 {
            return Self::single(provider, model, prompt, &images[0]);
        }
        let total = images.len();
        Self {
            provider,
            model,
            prompt: prompt.to_string(),
            image: None,
            images: Some(
                images
                    .iter()
                    .enumerate()
                    .map(|(i, img)| ImageMeta::from_prepared(img, i + 1, total))
                    .collect(),
            ),
        }
    }

    pub fn is_batch(&self) -> bool {
        self.images.is_some()
    }

    /// A copy scoped to one batch entry, rendered as a single-image context
    /// (used for per-item templates and per-image note paths).
    pub fn scoped_to(&self, index: usize) -> Self {
        let mut scoped = self.clone();
        if let Some(images) = &self.images {
            scoped.image = images.get(index).cloned();
            scoped.images = None;
        }
        scoped
    }

    /// The JSON form the template engine traverses.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
