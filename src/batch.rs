//! Batch protocol: many images in one provider call, recovered from a
//! sentinel-delimited response.
//!
//! The model is *instructed* to wrap each image's text between the literal
//! marker lines below; compliance is not guaranteed, so classification
//! degrades gracefully: one marker pair (or none) is treated as a single
//! logical result, never as a one-element batch.

use tracing::{info, warn};

use crate::error::ExtractError;
use crate::image::PreparedImage;
use crate::provider::VisionProvider;

/// Exact literal marker lines. Case-sensitive, no variation permitted.
pub const BATCH_BEGIN_MARKER: &str = "-----BEGIN IMAGE TEXT-----";
pub const BATCH_END_MARKER: &str = "-----END IMAGE TEXT-----";

/// Classification of one provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Two or more marker pairs: the Nth segment maps positionally to the
    /// Nth submitted image (trusted, not content-verified).
    Batch(Vec<String>),
    /// Exactly one pair, or no pairs at all: one logical result, rendered
    /// through the single-image path regardless of how many images were sent.
    Single(String),
}

/// Instruction block appended to the user's batch prompt.
pub fn batch_instruction(image_count: usize) -> String {
    format!(
        "\n\nYou are given {image_count} images. For EACH image, in order, output the \
         extracted text wrapped between a line containing exactly \
         \"{BATCH_BEGIN_MARKER}\" and a line containing exactly \"{BATCH_END_MARKER}\". \
         Output nothing outside these blocks."
    )
}

/// Scan `response` for non-overlapping begin/end marker pairs, in order, and
/// return the trimmed text between each pair.
pub fn split_batch_response(response: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut rest = response;
    while let Some(begin) = rest.find(BATCH_BEGIN_MARKER) {
        let after_begin = &rest[begin + BATCH_BEGIN_MARKER.len()..];
        let Some(end) = after_begin.find(BATCH_END_MARKER) else {
            break;
        };
        segments.push(after_begin[..end].trim().to_string());
        rest = &after_begin[end + BATCH_END_MARKER.len()..];
    }
    segments
}

/// Apply the 0/1/≥2 policy to a raw response.
pub fn classify_response(response: &str) -> BatchOutcome {
    let segments = split_batch_response(response);
    match segments.len() {
        0 => BatchOutcome::Single(response.trim().to_string()),
        1 => BatchOutcome::Single(segments.into_iter().next().unwrap_or_default()),
        _ => BatchOutcome::Batch(segments),
    }
}

/// Send `images` through one provider call and recover per-image results.
///
/// When the provider lacks batch support, only the first image is processed
/// and the request degrades to single-image mode, a silent capability gap
/// that is logged but not surfaced as an error.
pub async fn run_batch(
    provider: &dyn VisionProvider,
    images: &[PreparedImage],
    prompt: &str,
) -> Result<Option<BatchOutcome>, ExtractError> {
    if images.len() > 1 && !provider.supports_batch() {
        warn!(
            "{} does not support batching; processing only the first of {} images",
            provider.display_name(),
            images.len()
        );
        let text = provider.extract_single(&images[0], prompt).await?;
        return Ok(text.map(BatchOutcome::Single));
    }

    if images.len() == 1 {
        let text = provider.extract_single(&images[0], prompt).await?;
        return Ok(text.map(BatchOutcome::Single));
    }

    let instrumented = format!("{}{}", prompt, batch_instruction(images.len()));
    let Some(response) = provider.process(images, &instrumented).await? else {
        return Ok(None);
    };

    let outcome = classify_response(&response);
    if let BatchOutcome::Batch(segments) = &outcome {
        if segments.len() != images.len() {
            // Positional mapping is trusted; a mismatch means some segment
            // will be attributed to the wrong image. Known risk, logged.
            warn!(
                "batch returned {} delimited segments for {} images",
                segments.len(),
                images.len()
            );
        }
    }
    info!(
        "batch call over {} images classified as {}",
        images.len(),
        match &outcome {
            BatchOutcome::Batch(s) => format!("batch({})", s.len()),
            BatchOutcome::Single(_) => "single".to_string(),
        }
    );
    Ok(Some(outcome))
}
