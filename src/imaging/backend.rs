//! Frame loading trait and shared imaging types.
//!
//! The [`FrameLoader`] trait is the only way the compositing pipeline reads
//! pixels. The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), which decodes with the
//! `image` crate; tests swap in an in-memory mock.
//!
//! A failed load is a value, not a hard stop: callers record the
//! [`LoadFailure`], log it, and carry on without that frame.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Why a frame couldn't be loaded.
#[derive(Error, Debug)]
pub enum LoadCause {
    #[error("file not found")]
    NotFound,
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("decode failed: {0}")]
    Decode(image::ImageError),
}

#[derive(Error, Debug)]
#[error("{}: {cause}", .path.display())]
pub struct LoadFailure {
    pub path: PathBuf,
    #[source]
    pub cause: LoadCause,
}

impl LoadFailure {
    pub fn new(path: &Path, cause: LoadCause) -> Self {
        Self {
            path: path.to_path_buf(),
            cause,
        }
    }

    /// Classify an I/O error from opening `path`.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        let cause = if err.kind() == std::io::ErrorKind::NotFound {
            LoadCause::NotFound
        } else {
            LoadCause::Io(err)
        };
        Self::new(path, cause)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.cause, LoadCause::NotFound)
    }
}

/// Pixel size of an image or canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Source of decoded frames.
///
/// Implementations must hand back RGBA8 pixels. `Sync` so one loader can
/// serve every cell of a parallel batch.
pub trait FrameLoader: Sync {
    fn load(&self, path: &Path) -> Result<RgbaImage, LoadFailure>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory loader that records every path it is asked for.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockLoader {
        pub images: HashMap<PathBuf, RgbaImage>,
        pub loads: Mutex<Vec<String>>,
    }

    impl MockLoader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_image(mut self, path: impl Into<PathBuf>, image: RgbaImage) -> Self {
            self.images.insert(path.into(), image);
            self
        }

        pub fn get_loads(&self) -> Vec<String> {
            self.loads.lock().unwrap().clone()
        }
    }

    impl FrameLoader for MockLoader {
        fn load(&self, path: &Path) -> Result<RgbaImage, LoadFailure> {
            self.loads
                .lock()
                .unwrap()
                .push(path.to_string_lossy().to_string());

            self.images
                .get(path)
                .cloned()
                .ok_or_else(|| LoadFailure::new(path, LoadCause::NotFound))
        }
    }

    #[test]
    fn mock_records_loads() {
        let loader = MockLoader::new().with_image("a.png", RgbaImage::new(2, 3));

        let image = loader.load(Path::new("a.png")).unwrap();
        assert_eq!(Dimensions::of(&image), Dimensions::new(2, 3));

        let err = loader.load(Path::new("b.png")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.path, PathBuf::from("b.png"));

        assert_eq!(loader.get_loads(), vec!["a.png", "b.png"]);
    }

    #[test]
    fn io_not_found_is_classified() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(LoadFailure::from_io(Path::new("x.png"), err).is_not_found());

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(!LoadFailure::from_io(Path::new("x.png"), err).is_not_found());
    }

    #[test]
    fn failure_message_names_the_path() {
        let failure = LoadFailure::new(Path::new("arms/plate/gold.png"), LoadCause::NotFound);
        assert_eq!(failure.to_string(), "arms/plate/gold.png: file not found");
    }

    #[test]
    fn dimensions_display_and_emptiness() {
        assert_eq!(Dimensions::new(832, 1344).to_string(), "832x1344");
        assert!(Dimensions::new(0, 10).is_empty());
        assert!(!Dimensions::new(1, 1).is_empty());
    }
}
