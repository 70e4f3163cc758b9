//! Image acquisition: file handles, vault links, and remote URLs become
//! [`PreparedImage`] values ready for a provider call.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;
use std::io::Cursor;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::host::Vault;

/// One image ready for transmission to a provider.
///
/// `base64` never carries a `data:` prefix; the prefix is applied only at
/// the provider-protocol boundary via [`PreparedImage::data_uri`].
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Display filename, no path component.
    pub name: String,
    /// Base64 payload, standard alphabet, no data-URI prefix.
    pub base64: String,
    /// e.g. `image/png`.
    pub mime: String,
    /// Raw size in bytes, informational.
    pub size: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Original reference: vault path, URL, or `"inline"`.
    pub source: String,
}

impl PreparedImage {
    /// Prepare raw bytes for transmission. Mime is sniffed from magic bytes;
    /// a failed dimension probe is non-fatal and leaves `width`/`height`
    /// unset.
    pub fn from_bytes(name: &str, bytes: &[u8], source: &str) -> Self {
        let mime = sniff_mime(bytes);
        let dims = probe_dimensions(bytes);
        if dims.is_none() {
            debug!("could not probe dimensions for {}", name);
        }
        Self {
            name: name.to_string(),
            base64: BASE64.encode(bytes),
            mime,
            size: bytes.len(),
            width: dims.map(|(w, _)| w),
            height: dims.map(|(_, h)| h),
            source: source.to_string(),
        }
    }

    /// The `data:` URI form required by some provider protocols.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

/// Load an image referenced by a vault-relative link.
pub async fn load_from_vault(vault: &dyn Vault, link: &str) -> Result<PreparedImage, ExtractError> {
    let path = vault
        .resolve_link(link)
        .await
        .ok_or_else(|| ExtractError::ImageNotFound {
            link: link.to_string(),
        })?;
    let bytes = vault
        .read_binary(&path)
        .await
        .map_err(ExtractError::ImageRead)?;
    let name = path.rsplit('/').next().unwrap_or(&path).to_string();
    Ok(PreparedImage::from_bytes(&name, &bytes, &path))
}

/// Fetch a remote image over HTTP(S). Any failure (unreachable host, blocked
/// request, non-2xx status) surfaces as [`ExtractError::FetchBlocked`] with
/// a workaround hint in the user message.
pub async fn fetch_remote(
    client: &reqwest::Client,
    url: &str,
) -> Result<PreparedImage, ExtractError> {
    let blocked = || ExtractError::FetchBlocked {
        url: url.to_string(),
    };

    let resp = client.get(url).send().await.map_err(|e| {
        warn!("remote image fetch failed for {}: {}", url, e);
        blocked()
    })?;
    if !resp.status().is_success() {
        warn!("remote image fetch for {} returned {}", url, resp.status());
        return Err(blocked());
    }
    let bytes = resp.bytes().await.map_err(|e| {
        warn!("remote image body read failed for {}: {}", url, e);
        blocked()
    })?;

    let name = url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("remote-image")
        .split('?')
        .next()
        .unwrap_or("remote-image")
        .to_string();
    Ok(PreparedImage::from_bytes(&name, &bytes, url))
}

/// Mime type from magic bytes. Unknown formats default to `image/png`, which
/// every backend accepts as a declared type even when it is wrong.
fn sniff_mime(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => {
            debug!("unrecognized image format, defaulting to image/png");
            "image/png"
        }
    }
    .to_string()
}

/// Pixel dimensions from the header only (no full decode).
fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryVault;

    // 1x1 transparent PNG.
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_from_bytes_sniffs_png_and_dimensions() {
        let img = PreparedImage::from_bytes("dot.png", TINY_PNG, "inline");
        assert_eq!(img.mime, "image/png");
        assert_eq!(img.width, Some(1));
        assert_eq!(img.height, Some(1));
        assert_eq!(img.size, TINY_PNG.len());
    }

    #[test]
    fn test_base64_has_no_data_prefix() {
        let img = PreparedImage::from_bytes("dot.png", TINY_PNG, "inline");
        assert!(!img.base64.starts_with("data:"));
        assert!(img.data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_unknown_bytes_still_prepare() {
        let img = PreparedImage::from_bytes("blob", &[0x00, 0x01, 0x02], "inline");
        assert_eq!(img.mime, "image/png");
        assert_eq!(img.width, None);
        assert_eq!(img.height, None);
    }

    #[tokio::test]
    async fn test_load_from_vault_missing_is_not_found() {
        let vault = MemoryVault::new();
        let err = load_from_vault(&vault, "absent.png").await.unwrap_err();
        assert!(matches!(err, ExtractError::ImageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_from_vault_strips_path_from_name() {
        let vault = MemoryVault::new().with_binary("attachments/scan.png", TINY_PNG.to_vec());
        let img = load_from_vault(&vault, "scan.png").await.unwrap();
        assert_eq!(img.name, "scan.png");
        assert_eq!(img.source, "attachments/scan.png");
    }
}
