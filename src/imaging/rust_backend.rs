//! Pure Rust frame loading and PNG output via the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Open + sniff format | `image::ImageReader::open` + `with_guessed_format` |
//! | Decode | `ImageReader::decode` |
//! | Normalize | `DynamicImage::ImageRgba8` passthrough, otherwise `to_rgba8` |
//! | Encode | `ImageBuffer::save_with_format(.., ImageFormat::Png)` |
//!
//! Normalization happens exactly once, here. Everything downstream works on
//! `RgbaImage` and never converts again.

use super::backend::{BackendError, FrameLoader, LoadCause, LoadFailure};
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use std::path::Path;

/// Loader backed by the filesystem and the `image` crate's decoders.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoader for RustBackend {
    fn load(&self, path: &Path) -> Result<RgbaImage, LoadFailure> {
        let reader = ImageReader::open(path)
            .map_err(|e| LoadFailure::from_io(path, e))?
            .with_guessed_format()
            .map_err(|e| LoadFailure::from_io(path, e))?;
        let decoded = reader
            .decode()
            .map_err(|e| LoadFailure::new(path, LoadCause::Decode(e)))?;
        Ok(into_rgba(decoded))
    }
}

/// Convert to RGBA8 unless the image already is.
pub fn into_rgba(image: DynamicImage) -> RgbaImage {
    match image {
        DynamicImage::ImageRgba8(buffer) => buffer,
        other => other.to_rgba8(),
    }
}

/// Write `image` as PNG. The parent directory must exist.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), BackendError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| BackendError::Encode {
            path: path.to_path_buf(),
            source,
        })
}
