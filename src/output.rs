//! Output routing: splice formatted text at the cursor or persist it to a
//! note, with append/unique-name collision handling.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::context::OcrContext;
use crate::error::ExtractError;
use crate::host::{Editor, Vault};
use crate::settings::OcrSettings;
use crate::template;

/// Final content handed to the router.
#[derive(Debug, Clone)]
pub enum RoutedContent {
    Single(String),
    /// `combined` is the fully composed batch document; `per_image` holds the
    /// per-image blocks in submission order for per-image note output.
    Batch {
        combined: String,
        per_image: Vec<String>,
    },
}

impl RoutedContent {
    fn combined(&self) -> &str {
        match self {
            Self::Single(text) => text,
            Self::Batch { combined, .. } => combined,
        }
    }
}

fn embed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^!\[\[[^\[\]|]+\.(png|jpe?g|gif|webp|bmp|tiff?)(\|[^\[\]]*)?\]\]$")
            .unwrap()
    })
}

/// Whether `selection` is exactly one inline image-embed token.
pub fn is_image_embed(selection: &str) -> bool {
    embed_re().is_match(selection.trim())
}

/// Place `content` according to the settings.
///
/// Priority order: embed replacement (selection is exactly an image embed),
/// then inline-at-cursor vs note-file per `output_to_note`. Every failure is
/// terminal for this invocation.
pub async fn route(
    settings: &OcrSettings,
    ctx: &OcrContext,
    content: &RoutedContent,
    vault: &dyn Vault,
    editor: &mut dyn Editor,
) -> Result<(), ExtractError> {
    // Embed short-circuit beats every other output setting.
    if let Some(selection) = editor.selection() {
        if is_image_embed(&selection) {
            debug!("selection is an image embed; replacing in place");
            editor
                .replace_selection(content.combined())
                .map_err(|e| ExtractError::Output {
                    path: "<editor>".to_string(),
                    cause: e,
                })?;
            return Ok(());
        }
    }

    if !settings.output_to_note {
        if editor.selection().is_none() {
            return Err(ExtractError::NoOutputTarget);
        }
        editor
            .replace_selection(content.combined())
            .map_err(|e| ExtractError::Output {
                path: "<editor>".to_string(),
                cause: e,
            })?;
        return Ok(());
    }

    // Note-file mode. Per-image notes apply only when the naming templates
    // actually pull image-specific fields; otherwise one combined note.
    match content {
        RoutedContent::Batch { per_image, .. }
            if ctx.is_batch() && naming_references_image(settings) =>
        {
            for (i, block) in per_image.iter().enumerate() {
                let scoped = ctx.scoped_to(i);
                write_note(settings, &scoped, block, vault).await?;
            }
            Ok(())
        }
        _ => write_note(settings, ctx, content.combined(), vault).await,
    }
}

/// Whether the note name or folder template mentions an `image.*` token.
fn naming_references_image(settings: &OcrSettings) -> bool {
    let mentions = |tpl: &str| {
        template_tokens(tpl)
            .iter()
            .any(|t| t == "image" || t.starts_with("image."))
    };
    mentions(&settings.note_name_template) || mentions(&settings.note_folder_template)
}

fn template_tokens(tpl: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").unwrap());
    re.captures_iter(tpl)
        .map(|c| c[1].trim().to_string())
        .collect()
}

async fn write_note(
    settings: &OcrSettings,
    ctx: &OcrContext,
    content: &str,
    vault: &dyn Vault,
) -> Result<(), ExtractError> {
    let ctx_value = ctx.to_value();
    let mut name = template::render(&settings.note_name_template, &ctx_value)
        .trim()
        .to_string();
    if name.is_empty() {
        name = "OCR".to_string();
    }
    let folder = template::render(&settings.note_folder_template, &ctx_value)
        .trim()
        .trim_matches('/')
        .to_string();

    if !folder.is_empty() && !vault.folder_exists(&folder).await {
        vault
            .create_folder(&folder)
            .await
            .map_err(|e| ExtractError::Output {
                path: folder.clone(),
                cause: e,
            })?;
    }

    let path = note_path(&folder, &name);

    if vault.exists(&path).await {
        if settings.append_to_existing {
            let existing = vault.read(&path).await.map_err(|e| ExtractError::Output {
                path: path.clone(),
                cause: e,
            })?;
            let merged = format!("{}\n\n{}", existing.trim_end(), content);
            vault
                .overwrite(&path, &merged)
                .await
                .map_err(|e| ExtractError::Output {
                    path: path.clone(),
                    cause: e,
                })?;
            info!("appended OCR output to {}", path);
            vault.open_at_end(&path).await.ok();
            return Ok(());
        }

        let unique = unique_path(vault, &folder, &name).await;
        vault
            .create(&unique, content)
            .await
            .map_err(|e| ExtractError::Output {
                path: unique.clone(),
                cause: e,
            })?;
        info!("created {} (collision-avoiding name)", unique);
        vault.open_at_end(&unique).await.ok();
        return Ok(());
    }

    vault
        .create(&path, content)
        .await
        .map_err(|e| ExtractError::Output {
            path: path.clone(),
            cause: e,
        })?;
    info!("created {}", path);
    vault.open_at_end(&path).await.ok();
    Ok(())
}

fn note_path(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        format!("{name}.md")
    } else {
        format!("{folder}/{name}.md")
    }
}

/// First non-colliding path among `name.md`, `name 1.md`, `name 2.md`, …
/// Never returns an existing path, so nothing is ever overwritten.
pub async fn unique_path(vault: &dyn Vault, folder: &str, name: &str) -> String {
    let base = note_path(folder, name);
    if !vault.exists(&base).await {
        return base;
    }
    let mut counter = 1u32;
    loop {
        let candidate = note_path(folder, &format!("{name} {counter}"));
        if !vault.exists(&candidate).await {
            return candidate;
        }
        counter += 1;
    }
}
