//! Image loading and compositing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Load + normalize** | `image::ImageReader` → RGBA8 |
//! | **Frame strips** | `imageops::replace` at cumulative offsets |
//! | **Blend** | [`over`] (straight-alpha source-over, rounded integer maths) |
//! | **Save** | PNG encoder |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for canvas and strip geometry (unit testable)
//! - **Backend**: [`FrameLoader`] trait + [`RustBackend`]
//! - **Compositor**: [`Compositor`] and the [`CanvasStrategy`] it follows

pub mod backend;
mod calculations;
pub mod compositor;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, FrameLoader, LoadCause, LoadFailure};
pub use calculations::{
    CELL_SIZE, GRID_COLUMNS, GRID_ROWS, STANDARD_SHEET, frame_offsets, grid_canvas,
    strip_dimensions,
};
pub use compositor::{CanvasStrategy, Compositor, Placement, composite_over, concat_frames, over};
pub use rust_backend::{RustBackend, save_png};
