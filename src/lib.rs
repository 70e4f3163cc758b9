//! Client-side OCR orchestration over interchangeable vision-model backends.
//!
//! Images go in as [`PreparedImage`] values; a configured
//! [`VisionProvider`] turns them into text (one call even for
//! batches, via a sentinel-delimited protocol); the template engine formats
//! the result; the output router splices it at the host's cursor or writes
//! it to a note. The host supplies storage and the edit surface through the
//! [`host::Vault`] and [`host::Editor`] seams.

pub mod batch;
pub mod context;
pub mod error;
pub mod host;
pub mod image;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod settings;
pub mod template;

pub use crate::batch::{BatchOutcome, BATCH_BEGIN_MARKER, BATCH_END_MARKER};
pub use crate::context::OcrContext;
pub use crate::error::ExtractError;
pub use crate::image::PreparedImage;
pub use crate::pipeline::OcrPipeline;
pub use crate::provider::{build_provider, ProviderKind, VisionProvider};
pub use crate::settings::{OcrSettings, ProviderConfig, DEFAULT_PROMPT};
