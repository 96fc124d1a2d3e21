//! Shared test utilities for the layersheet test suite.
//!
//! Solid-colour frames for compositing assertions, plus helpers that lay out
//! a throwaway asset library on disk for tests that go through the real PNG
//! backend.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_png(tmp.path(), "arms/male/steel.png", &solid(4, 4, RED));
//! write_definition(&tmp.path().join("defs"), "arms", r#"{"variants": ["steel"], ...}"#);
//! ```

use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// A `width`×`height` frame filled with one colour.
pub fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color)
}

/// Write `image` as PNG at `root/relative`, creating directories as needed.
pub fn write_png(root: &Path, relative: &str, image: &RgbaImage) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image.save(&path).unwrap();
    path
}

/// Write `<dir>/<name>.json`, creating `dir` as needed.
pub fn write_definition(dir: &Path, name: &str, json: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{name}.json"));
    std::fs::write(&path, json).unwrap();
    path
}

/// Read back a PNG written by a test.
pub fn read_png(path: &Path) -> RgbaImage {
    image::open(path).unwrap().to_rgba8()
}
