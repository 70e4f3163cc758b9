//! Error taxonomy for the extraction pipeline.
//!
//! Every variant is terminal for the invocation that produced it; there are
//! no retries anywhere in the pipeline. Each carries enough context for a
//! short user-facing notice via [`ExtractError::user_message`], while the
//! `Display` form stays developer-facing for logs.

use thiserror::Error;

/// Failures surfaced by the OCR pipeline.
///
/// Transport failures and non-2xx statuses never appear here: the provider
/// adapter absorbs them into an absent result after logging, so the only
/// provider-side variant is the non-JSON case below.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The backend returned a body that does not parse as JSON at all.
    /// This is the only provider failure that crosses the adapter boundary
    /// as an error; shape mismatches on valid JSON are logged and absorbed.
    #[error("{provider} returned a non-JSON response")]
    MalformedResponse {
        provider: String,
        /// Raw payload kept for diagnosis (truncated by the logger, not here).
        payload: String,
    },

    /// The provider call settled but produced no usable text.
    #[error("no text could be extracted from the image(s)")]
    NoText,

    /// A vault-relative image link resolved to nothing.
    #[error("image not found: {link}")]
    ImageNotFound { link: String },

    /// A remote image URL could not be fetched (blocked, non-2xx, or
    /// unreachable). Distinct from [`ExtractError::ImageNotFound`] so the
    /// user message can suggest a manual workaround.
    #[error("could not fetch remote image: {url}")]
    FetchBlocked { url: String },

    /// An image's bytes could not be read from the vault.
    #[error("failed to read image data: {0}")]
    ImageRead(anyhow::Error),

    /// Inline output requested but there is no active edit surface.
    #[error("no active editor to insert text into")]
    NoOutputTarget,

    /// Folder or note creation failed in the vault.
    #[error("output failed at {path}: {cause}")]
    Output { path: String, cause: anyhow::Error },
}

impl ExtractError {
    /// Short notice suitable for a host-side toast/notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::MalformedResponse { provider, .. } => {
                format!("{provider} sent an unreadable response. See the log for details.")
            }
            Self::NoText => "No text was extracted. Try a different model or prompt.".to_string(),
            Self::ImageNotFound { link } => format!("Image not found: {link}"),
            Self::FetchBlocked { url } => format!(
                "Could not download {url}. Save the image locally and run extraction on the file."
            ),
            Self::ImageRead(_) => "The image file could not be read.".to_string(),
            Self::NoOutputTarget => {
                "Open a note and place the cursor where the text should go.".to_string()
            }
            Self::Output { path, .. } => format!("Could not write output to {path}."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_blocked_suggests_workaround() {
        let err = ExtractError::FetchBlocked {
            url: "https://example.com/a.png".to_string(),
        };
        assert!(err.user_message().contains("Save the image locally"));
    }

    #[test]
    fn test_not_found_and_blocked_are_distinct_messages() {
        let not_found = ExtractError::ImageNotFound {
            link: "a.png".to_string(),
        };
        let blocked = ExtractError::FetchBlocked {
            url: "https://x/a.png".to_string(),
        };
        assert_ne!(not_found.user_message(), blocked.user_message());
    }
}
