//! # layersheet
//!
//! A layered 2D sprite-sheet compositor. A sheet definition (JSON) lists
//! numbered layers, each pointing at an asset directory per body type; a
//! render blends the chosen variant of every layer, bottom to top, into one
//! RGBA sheet.
//!
//! # Architecture: Resolve → Load → Composite
//!
//! ```text
//! definition.json ─┐
//! variant, sex ────┼─► resolve ──► paths ──► FrameLoader ──► frames ──► Compositor ──► sheet.png
//! template params ─┘   (pure)                 (I/O)                      (pure)
//! ```
//!
//! Resolution is pure string work and compositing is pure pixel work; only
//! the [`imaging::FrameLoader`] touches the filesystem. Tests swap in an
//! in-memory loader and exercise the whole pipeline without a single PNG.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`definition`] | Sheet definition model: variants, `layer_N` paths per body type, animations |
//! | [`resolve`] | Layer base path → concrete file path(s): templates, rewrites, layouts |
//! | [`imaging`] | Frame loading, strip concatenation, canvas strategies, alpha compositing |
//! | [`compose`] | One sheet or a batch of sheets from a definition |
//! | [`character`] | Whole characters assembled from a component library |
//! | [`config`] | JSON render config: jobs, canvas, layout, parallelism |
//! | [`cache`] | Content-addressed output cache for incremental renders |
//! | [`render`] | Config-driven runs that write PNGs and report progress |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Degrade, Don't Abort
//!
//! Art libraries are always incomplete. A missing frame or layer is logged and
//! recorded on the result, and the sheet is still produced from whatever did
//! load. Only a request the definition can't serve at all (unknown variant,
//! unsupported body type) is an error.
//!
//! ## Straight-Alpha Source-Over
//!
//! Layers are blended with [`imaging::over`], in layer order, at the origin.
//! The maths is integer with rounding, so an opaque pixel stays opaque and
//! composing the same inputs twice yields identical bytes.
//!
//! ## Fixed or Adaptive Canvas
//!
//! The stock canvas is the 13×21 grid of 64px cells (832×1344). Asset sets
//! cut as per-animation strips can instead size the canvas from the layers
//! themselves; see [`imaging::CanvasStrategy`].

pub mod cache;
pub mod character;
pub mod compose;
pub mod config;
pub mod definition;
pub mod imaging;
pub(crate) mod ordered;
pub mod output;
pub mod render;
pub mod resolve;

#[cfg(test)]
pub(crate) mod test_helpers;
