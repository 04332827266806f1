//! Image ingestion: upload checks, data-URI encoding and source loading.
//!
//! Uploaded images (photo and logos) are accepted only as JPEG or PNG and
//! are kept in memory as `data:` URIs ([`ImageRef`]). Logo overrides from the
//! configuration may also point at local paths or http(s) URLs; those are
//! loaded through [`ImageLoader`] when a document is exported.
//!
//! # Example
//!
//! ```rust
//! use jobdesc::images::{ImageFormat, ImageLoader};
//! use std::path::Path;
//!
//! assert_eq!(ImageFormat::from_path("photo.JPG"), Some(ImageFormat::Jpeg));
//! let loader = ImageLoader::new(Some(Path::new("./forms/staff.toml")));
//! // Relative entries resolve next to the form file:
//! // loader.load_upload("photo.jpg") reads ./forms/photo.jpg
//! ```

use crate::model::ImageRef;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Uploads above this size are accepted but logged.
pub const UPLOAD_SIZE_GUIDANCE: usize = 5 * 1024 * 1024;

/// Image formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Detect image format from the file extension.
    ///
    /// ```
    /// use jobdesc::images::ImageFormat;
    /// assert_eq!(ImageFormat::from_path("photo.jpeg"), Some(ImageFormat::Jpeg));
    /// assert_eq!(ImageFormat::from_path("logo.png"), Some(ImageFormat::Png));
    /// assert_eq!(ImageFormat::from_path("logo.svg"), None);
    /// ```
    pub fn from_path(path: &str) -> Option<ImageFormat> {
        let lower = path.to_lowercase();
        if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            Some(ImageFormat::Jpeg)
        } else if lower.ends_with(".png") {
            Some(ImageFormat::Png)
        } else {
            None
        }
    }

    /// Detect image format from the leading magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<ImageFormat> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else {
            None
        }
    }

    pub fn from_mime(mime: &str) -> Option<ImageFormat> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Error types for image operations.
#[derive(Debug)]
pub enum ImageError {
    /// Failed to load image from local filesystem
    LoadError(String),
    /// Failed to download image from remote URL
    DownloadError(String),
    /// Failed to resolve image path
    PathResolutionError(String),
    /// Not a JPEG or PNG
    UnsupportedFormat(String),
    /// Data URI payload is not valid base64 or not an image
    DecodeError(String),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageError::LoadError(e) => write!(f, "Failed to load image: {}", e),
            ImageError::DownloadError(e) => write!(f, "Failed to download image: {}", e),
            ImageError::PathResolutionError(e) => write!(f, "Failed to resolve path: {}", e),
            ImageError::UnsupportedFormat(e) => {
                write!(f, "Unsupported image format: {} (only JPEG and PNG are allowed)", e)
            }
            ImageError::DecodeError(e) => write!(f, "Invalid image data: {}", e),
        }
    }
}

impl std::error::Error for ImageError {}

/// Loaded image bytes with metadata.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw image bytes
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl ImageData {
    pub fn to_image_ref(&self) -> ImageRef {
        encode_data_uri(&self.bytes, self.format)
    }
}

/// Wraps raw image bytes into a `data:` URI reference.
pub fn encode_data_uri(bytes: &[u8], format: ImageFormat) -> ImageRef {
    ImageRef::from_parts(format.mime_type(), &BASE64.encode(bytes))
}

/// Decodes the base64 payload of a data URI.
pub fn decode_data_uri(image: &ImageRef) -> Result<Vec<u8>, ImageError> {
    BASE64
        .decode(image.payload().trim())
        .map_err(|e| ImageError::DecodeError(e.to_string()))
}

/// Decodes and verifies that the payload really is a JPEG or PNG.
pub fn validate_data_uri(image: &ImageRef) -> Result<ImageFormat, ImageError> {
    let bytes = decode_data_uri(image)?;
    let format = ImageFormat::from_magic(&bytes)
        .ok_or_else(|| ImageError::UnsupportedFormat(image.mime_type().to_string()))?;
    if ImageFormat::from_mime(image.mime_type()).is_none() {
        return Err(ImageError::UnsupportedFormat(image.mime_type().to_string()));
    }
    Ok(format)
}

fn is_remote(url_or_path: &str) -> bool {
    url_or_path.starts_with("http://") || url_or_path.starts_with("https://")
}

/// Loads images relative to a form file, from disk or over HTTP.
/// Successful loads are cached by their original entry.
pub struct ImageLoader {
    /// Base directory for resolving relative paths
    base_dir: Option<PathBuf>,
    cache: HashMap<String, ImageData>,
    allow_remote: bool,
}

impl ImageLoader {
    /// Create a loader that resolves relative paths next to `document_path`.
    pub fn new(document_path: Option<&Path>) -> Self {
        let base_dir = document_path
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf());
        ImageLoader {
            base_dir,
            cache: HashMap::new(),
            allow_remote: true,
        }
    }

    /// Enable or disable remote image downloading.
    pub fn set_allow_remote(&mut self, allow: bool) {
        self.allow_remote = allow;
    }

    /// Resolve an image path relative to the form location.
    ///
    /// Absolute URLs (http/https) and absolute paths are returned as-is.
    pub fn resolve_path(&self, url_or_path: &str) -> Result<String, ImageError> {
        if is_remote(url_or_path) || Path::new(url_or_path).is_absolute() {
            return Ok(url_or_path.to_string());
        }

        let Some(ref base) = self.base_dir else {
            return Ok(url_or_path.to_string());
        };

        let resolved = base.join(url_or_path);
        let resolved_str = resolved.to_str().map(|s| s.to_string()).ok_or_else(|| {
            ImageError::PathResolutionError(format!(
                "Failed to convert path to string: {:?}",
                resolved
            ))
        })?;
        debug!("[ImageLoader] Resolved {} to {}", url_or_path, resolved_str);
        Ok(resolved_str)
    }

    /// Load an image from a path or URL, accepting only JPEG and PNG.
    ///
    /// The format comes from the magic bytes; the extension is only a hint
    /// for files whose header cannot be recognized.
    pub fn load(&mut self, url_or_path: &str) -> Result<ImageData, ImageError> {
        if let Some(data) = self.cache.get(url_or_path) {
            return Ok(data.clone());
        }

        let resolved = self.resolve_path(url_or_path)?;
        let bytes = if is_remote(&resolved) {
            if !self.allow_remote {
                return Err(ImageError::DownloadError(
                    "Remote images are disabled".to_string(),
                ));
            }
            self.load_remote(&resolved)?
        } else {
            self.load_local(&resolved)?
        };

        let format = ImageFormat::from_magic(&bytes).ok_or_else(|| {
            let hint = ImageFormat::from_path(&resolved)
                .map(|f| format!("{} does not contain {} data", resolved, f.mime_type()))
                .unwrap_or_else(|| resolved.clone());
            ImageError::UnsupportedFormat(hint)
        })?;

        if bytes.len() > UPLOAD_SIZE_GUIDANCE {
            warn!(
                "{} is {:.1} MB; images up to 5 MB are recommended",
                url_or_path,
                bytes.len() as f64 / (1024.0 * 1024.0)
            );
        }

        let image_data = ImageData { bytes, format };
        self.cache
            .insert(url_or_path.to_string(), image_data.clone());
        Ok(image_data)
    }

    /// Turns a form entry into an [`ImageRef`]. Entries may be `data:` URIs
    /// (validated in place), paths, or URLs.
    pub fn load_upload(&mut self, entry: &str) -> Result<ImageRef, ImageError> {
        let entry = entry.trim();
        if entry.starts_with("data:") {
            let image = ImageRef::from_data_uri(entry).map_err(ImageError::DecodeError)?;
            validate_data_uri(&image)?;
            return Ok(image);
        }
        Ok(self.load(entry)?.to_image_ref())
    }

    fn load_local(&self, path: &str) -> Result<Vec<u8>, ImageError> {
        debug!("[ImageLoader] Loading local file: {}", path);
        std::fs::read(path)
            .map_err(|e| ImageError::LoadError(format!("Failed to read file {}: {}", path, e)))
    }

    /// Requires the `fetch` feature.
    fn load_remote(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        #[cfg(feature = "fetch")]
        {
            debug!("[ImageLoader] Downloading {}", url);
            let response = reqwest::blocking::Client::new()
                .get(url)
                .send()
                .map_err(|e| {
                    ImageError::DownloadError(format!("Failed to download {}: {}", url, e))
                })?;
            if !response.status().is_success() {
                return Err(ImageError::DownloadError(format!(
                    "{} answered {}",
                    url,
                    response.status()
                )));
            }
            response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| ImageError::DownloadError(format!("Failed to read response: {}", e)))
        }

        #[cfg(not(feature = "fetch"))]
        {
            Err(ImageError::DownloadError(format!(
                "Remote image loading from {} requires the 'fetch' feature",
                url
            )))
        }
    }
}

/// Upload an image file the way the form's file picker does.
pub fn load_upload(path: &Path) -> Result<ImageRef, ImageError> {
    let path_str = path.to_str().ok_or_else(|| {
        ImageError::PathResolutionError(format!("Non UTF-8 path: {:?}", path))
    })?;
    let mut loader = ImageLoader::new(None);
    loader.set_allow_remote(false);
    loader.load_upload(path_str)
}
