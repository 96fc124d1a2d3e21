//! Sprite sheet composition.
//!
//! Turns one (definition, variant, body type) selection into a single RGBA
//! image. Layers are visited in index order; each is resolved to asset paths
//! ([`crate::resolve`]), loaded through a [`FrameLoader`], laid out as a strip
//! when it has several frames, and blended onto the running canvas
//! ([`crate::imaging::Compositor`]).
//!
//! ## Failure policy
//!
//! Only the selection itself can fail a composition: an unsupported body type
//! or an unknown variant. Everything below that degrades instead of aborting:
//!
//! | Situation | Effect |
//! |---|---|
//! | layer has no path for the body type | skipped silently |
//! | path can't be resolved | layer skipped, warning |
//! | some frames fail to load | layer drawn without them, warning per frame |
//! | every frame fails | layer skipped, warning per frame |
//!
//! Each layer's fate is recorded as a [`LayerOutcome`] on the returned
//! [`Composite`], so callers can report what was left out.
//!
//! ## Batches
//!
//! [`compose_batch`] runs the variant × body type cross product. Cells share
//! only the read-only definition and loader, so they run in parallel on the
//! rayon pool; results come back in variant-major order regardless.

use crate::definition::{DefinitionError, Sex, SheetDefinition};
use crate::imaging::{
    CanvasStrategy, Compositor, Dimensions, FrameLoader, LoadFailure, Placement, concat_frames,
};
use crate::resolve::{PathLayout, Resolution, Resolver, TemplateParams, UnresolvedLayer};
use image::RgbaImage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("{0}")]
    MalformedDefinition(#[from] DefinitionError),
    #[error("Sex '{sex}' not supported in definition {definition}")]
    UnsupportedSex { definition: String, sex: Sex },
    #[error("Variant '{variant}' not found in definition {definition}")]
    UnknownVariant { definition: String, variant: String },
}

/// Canvas and path settings shared by every composition of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionOptions {
    pub canvas: CanvasStrategy,
    pub layout: PathLayout,
    /// Directory resolved asset paths are relative to.
    pub asset_root: PathBuf,
}

impl CompositionOptions {
    /// Per-animation strips on a canvas sized by the assets themselves.
    pub fn adaptive() -> Self {
        Self {
            canvas: CanvasStrategy::Adaptive,
            layout: PathLayout::PerAnimation,
            asset_root: PathBuf::new(),
        }
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }
}

impl Default for CompositionOptions {
    fn default() -> Self {
        Self {
            canvas: CanvasStrategy::standard(),
            layout: PathLayout::Single,
            asset_root: PathBuf::new(),
        }
    }
}

/// What to compose from a definition.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub variant: &'a str,
    pub sex: Sex,
    pub params: Option<&'a TemplateParams>,
}

impl<'a> Selection<'a> {
    pub fn new(variant: &'a str, sex: Sex) -> Self {
        Self {
            variant,
            sex,
            params: None,
        }
    }

    pub fn with_params(mut self, params: Option<&'a TemplateParams>) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug)]
pub enum SkipReason {
    /// The layer has no asset for the requested body type.
    NotForSex,
    Unresolved(UnresolvedLayer),
    /// Nothing the layer points at could be loaded.
    NothingLoaded(Vec<LoadFailure>),
}

/// Fate of one layer during composition.
#[derive(Debug)]
pub enum LayerOutcome {
    Applied {
        layer: usize,
        /// Files that contributed, in strip order.
        sources: Vec<PathBuf>,
        /// Frames that failed while others loaded.
        missing: Vec<LoadFailure>,
        placement: Placement,
    },
    Skipped {
        layer: usize,
        reason: SkipReason,
    },
}

impl LayerOutcome {
    pub fn layer(&self) -> usize {
        match self {
            LayerOutcome::Applied { layer, .. } | LayerOutcome::Skipped { layer, .. } => *layer,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, LayerOutcome::Applied { .. })
    }
}

/// A finished sheet plus the per-layer record of how it was built.
#[derive(Debug)]
pub struct Composite {
    pub image: RgbaImage,
    pub layers: Vec<LayerOutcome>,
}

impl Composite {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }

    pub fn applied_layers(&self) -> usize {
        self.layers.iter().filter(|l| l.is_applied()).count()
    }

    /// One line per unresolved layer and per asset that failed to load.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for outcome in &self.layers {
            match outcome {
                LayerOutcome::Applied { layer, missing, .. } => {
                    for failure in missing {
                        lines.push(format!("layer_{layer}: missing frame {failure}"));
                    }
                }
                LayerOutcome::Skipped {
                    reason: SkipReason::Unresolved(unresolved),
                    ..
                } => lines.push(unresolved.to_string()),
                LayerOutcome::Skipped {
                    layer,
                    reason: SkipReason::NothingLoaded(failures),
                } => {
                    for failure in failures {
                        lines.push(format!("layer_{layer}: skipped, {failure}"));
                    }
                }
                LayerOutcome::Skipped {
                    reason: SkipReason::NotForSex,
                    ..
                } => {}
            }
        }
        lines
    }
}

/// Asset paths for one layer, without loading anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLayer {
    pub layer: usize,
    pub resolution: Result<Resolution, UnresolvedLayer>,
}

impl PlannedLayer {
    /// Every file this layer may read, joined onto `root`.
    pub fn asset_paths(&self, root: &Path) -> Vec<PathBuf> {
        match &self.resolution {
            Ok(resolution) => resolution.paths().iter().map(|p| root.join(p)).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Reject selections the definition can't render.
pub fn check_selection(
    definition: &SheetDefinition,
    selection: &Selection<'_>,
) -> Result<(), ComposeError> {
    if !definition.supports_sex(selection.sex) {
        return Err(ComposeError::UnsupportedSex {
            definition: definition.name.clone(),
            sex: selection.sex,
        });
    }
    if !definition.is_valid_variant(selection.variant) {
        return Err(ComposeError::UnknownVariant {
            definition: definition.name.clone(),
            variant: selection.variant.to_string(),
        });
    }
    Ok(())
}

/// Resolve every layer for a selection.
pub fn plan_layers(
    definition: &SheetDefinition,
    selection: &Selection<'_>,
    options: &CompositionOptions,
) -> Vec<PlannedLayer> {
    let resolver = Resolver::new(definition, selection.params, options.layout);
    definition
        .layers
        .iter()
        .enumerate()
        .map(|(i, layer)| PlannedLayer {
            layer: i + 1,
            resolution: resolver.resolve(i + 1, layer, selection.sex, selection.variant),
        })
        .collect()
}

/// Frames loaded for one layer.
pub(crate) struct LoadedLayer {
    pub image: Option<RgbaImage>,
    pub sources: Vec<PathBuf>,
    pub failures: Vec<LoadFailure>,
}

/// Load whatever `resolution` points at, joined onto `root`.
///
/// Per-animation layers fall back to the combined sheet only when none of
/// their frames load; that fallback's own failure is recorded too. Frames
/// that do load are concatenated in animation order with no gap left for
/// missing ones.
pub(crate) fn load_layer(
    resolution: &Resolution,
    root: &Path,
    loader: &impl FrameLoader,
) -> LoadedLayer {
    let mut sources = Vec::new();
    let mut failures = Vec::new();
    let mut frames = Vec::new();

    let mut try_load = |path: &Path, frames: &mut Vec<RgbaImage>| {
        let full = root.join(path);
        match loader.load(&full) {
            Ok(image) => {
                frames.push(image);
                sources.push(full);
            }
            Err(failure) => failures.push(failure),
        }
    };

    match resolution {
        Resolution::Skip => {}
        Resolution::Single(path) => try_load(path, &mut frames),
        Resolution::PerAnimation {
            frames: frame_paths,
            combined,
        } => {
            for frame in frame_paths {
                try_load(&frame.path, &mut frames);
            }
            if frames.is_empty() {
                try_load(combined, &mut frames);
            }
        }
    }

    LoadedLayer {
        image: concat_frames(frames),
        sources,
        failures,
    }
}

/// Compose one sheet.
#[tracing::instrument(skip_all, fields(definition = %definition.name, variant = selection.variant, sex = %selection.sex))]
pub fn compose_one(
    definition: &SheetDefinition,
    selection: Selection<'_>,
    options: &CompositionOptions,
    loader: &impl FrameLoader,
) -> Result<Composite, ComposeError> {
    check_selection(definition, &selection)?;

    let mut compositor = Compositor::new(options.canvas);
    let mut layers = Vec::with_capacity(definition.layers.len());

    for planned in plan_layers(definition, &selection, options) {
        let index = planned.layer;
        let outcome = match planned.resolution {
            Ok(Resolution::Skip) => {
                debug!(layer = index, "no asset for this sex");
                LayerOutcome::Skipped {
                    layer: index,
                    reason: SkipReason::NotForSex,
                }
            }
            Ok(resolution) => apply_layer(
                index,
                &resolution,
                &options.asset_root,
                loader,
                &mut compositor,
            ),
            Err(unresolved) => {
                warn!(layer = index, "{unresolved}");
                LayerOutcome::Skipped {
                    layer: index,
                    reason: SkipReason::Unresolved(unresolved),
                }
            }
        };
        layers.push(outcome);
    }

    Ok(Composite {
        image: compositor.finish(),
        layers,
    })
}

fn apply_layer(
    index: usize,
    resolution: &Resolution,
    root: &Path,
    loader: &impl FrameLoader,
    compositor: &mut Compositor,
) -> LayerOutcome {
    let loaded = load_layer(resolution, root, loader);
    for failure in &loaded.failures {
        warn!(layer = index, path = %failure.path.display(), "image not found or unreadable: {}", failure.cause);
    }

    let Some(image) = loaded.image else {
        return LayerOutcome::Skipped {
            layer: index,
            reason: SkipReason::NothingLoaded(loaded.failures),
        };
    };

    let placement = compositor.add_layer(&image);
    match placement {
        Placement::Exact => {}
        Placement::Clipped { canvas, layer } => {
            debug!(layer = index, %canvas, size = %layer, "layer size differs from fixed canvas");
        }
        Placement::Reallocated { from, to, discarded } if discarded > 0 => {
            warn!(layer = index, %from, %to, discarded, "canvas reallocated, earlier layers dropped");
        }
        Placement::Reallocated { to, .. } => {
            debug!(layer = index, size = %to, "canvas sized from layer");
        }
    }

    LayerOutcome::Applied {
        layer: index,
        sources: loaded.sources,
        missing: loaded.failures,
        placement,
    }
}

/// One cell of a batch.
#[derive(Debug)]
pub struct BatchCell {
    pub variant: String,
    pub sex: Sex,
    pub result: Result<Composite, ComposeError>,
}

/// Compose the cross product of `variants` × `sexes`.
///
/// `None` or an empty list means every variant of the definition, and every
/// body type layer 1 supports, respectively.
pub fn compose_batch(
    definition: &SheetDefinition,
    variants: Option<&[String]>,
    sexes: Option<&[Sex]>,
    params: Option<&TemplateParams>,
    options: &CompositionOptions,
    loader: &impl FrameLoader,
) -> Vec<BatchCell> {
    let cells = batch_cells(definition, variants, sexes);
    cells
        .into_par_iter()
        .map(|(variant, sex)| {
            let selection = Selection::new(&variant, sex).with_params(params);
            let result = compose_one(definition, selection, options, loader);
            BatchCell {
                variant,
                sex,
                result,
            }
        })
        .collect()
}

/// Variants a batch covers: the requested ones, or every variant when none are.
pub fn batch_variants<'a>(
    definition: &'a SheetDefinition,
    variants: Option<&'a [String]>,
) -> &'a [String] {
    match variants {
        Some(v) if !v.is_empty() => v,
        _ => &definition.variants,
    }
}

/// The (variant, sex) pairs of a batch in variant-major order.
pub fn batch_cells(
    definition: &SheetDefinition,
    variants: Option<&[String]>,
    sexes: Option<&[Sex]>,
) -> Vec<(String, Sex)> {
    let variants = batch_variants(definition, variants);
    let sexes: Vec<Sex> = match sexes {
        Some(s) if !s.is_empty() => s.to_vec(),
        _ => definition.required_sexes(),
    };

    variants
        .iter()
        .flat_map(|variant| sexes.iter().map(move |sex| (variant.clone(), *sex)))
        .collect()
}
