//! Whole-character sheets assembled from a sprite library by component.
//!
//! Where a sheet definition spells out every layer path, a character only
//! names components and the library layout supplies the paths:
//!
//! ```text
//! spritesheets/
//! ├── body/bodies/<sex>/<animation>/<body_variant>.png   # base body
//! └── <type>/<style>/<sex>/<animation>/<variant>.png     # e.g. hair/long/female/walk/black.png
//! ```
//!
//! A component directory may hold one combined `<variant>.png` instead of
//! per-animation strips; it is used when no strip is found. Strips that are
//! absent (not every item has every animation) are only logged at debug
//! level, and the strips that do exist are packed left to right without a
//! gap. A component missing an early animation therefore lines up with the
//! body only if the body's earlier strips have the same widths; otherwise
//! its later strips land on the body's earlier columns.
//!
//! The body strip fixes the canvas size. Components are blended over it at
//! the origin in the order they are listed; anything wider or taller than the
//! body is clipped.

use crate::compose::load_layer;
use crate::definition::{DEFAULT_ANIMATIONS, Sex};
use crate::imaging::{CanvasStrategy, Compositor, Dimensions, FrameLoader, LoadFailure};
use crate::ordered;
use crate::resolve::{animation_paths, component_base};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CharacterError {
    #[error("Could not load body frames for {sex} {variant}")]
    MissingBody {
        sex: Sex,
        variant: String,
        failures: Vec<LoadFailure>,
    },
}

/// Style and variant of one component. Either may be missing in hand-written
/// configs, in which case the component is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl ComponentSpec {
    pub fn new(style: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            style: Some(style.into()),
            variant: Some(variant.into()),
        }
    }
}

/// A character to assemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CharacterSpec {
    /// Output file stem.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_sex")]
    pub sex: Sex,
    #[serde(default = "default_body_variant")]
    pub body_variant: String,
    /// Component type → style/variant, blended in this order.
    #[serde(
        default,
        deserialize_with = "ordered::deserialize",
        serialize_with = "ordered::serialize"
    )]
    pub components: Vec<(String, ComponentSpec)>,
    /// Strip order; the standard animation list when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animations: Option<Vec<String>>,
}

fn default_name() -> String {
    "character".to_string()
}

fn default_sex() -> Sex {
    Sex::Male
}

fn default_body_variant() -> String {
    "light".to_string()
}

impl CharacterSpec {
    pub fn new(name: impl Into<String>, sex: Sex, body_variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sex,
            body_variant: body_variant.into(),
            components: Vec::new(),
            animations: None,
        }
    }

    pub fn with_component(mut self, component_type: impl Into<String>, spec: ComponentSpec) -> Self {
        self.components.push((component_type.into(), spec));
        self
    }

    pub fn animations(&self) -> Vec<&str> {
        match &self.animations {
            Some(own) => own.iter().map(String::as_str).collect(),
            None => DEFAULT_ANIMATIONS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOutcome {
    Applied { component: String, frames: usize },
    Skipped { component: String, reason: String },
}

#[derive(Debug)]
pub struct CharacterSheet {
    pub image: RgbaImage,
    pub components: Vec<ComponentOutcome>,
}

impl CharacterSheet {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }
}

/// Every file [`create_character`] may read for `spec`, body first.
pub fn candidate_paths(spec: &CharacterSpec, spritesheets: &Path) -> Vec<PathBuf> {
    let animations = spec.animations();
    let body = component_base(spritesheets, "body", "bodies", spec.sex);
    let mut paths: Vec<PathBuf> = animation_paths(&body, &animations, &spec.body_variant)
        .paths()
        .into_iter()
        .map(Path::to_path_buf)
        .collect();

    for (component_type, details) in &spec.components {
        if let (Some(style), Some(variant)) = (&details.style, &details.variant) {
            let base = component_base(spritesheets, component_type, style, spec.sex);
            paths.extend(
                animation_paths(&base, &animations, variant)
                    .paths()
                    .into_iter()
                    .map(Path::to_path_buf),
            );
        }
    }
    paths
}

/// Load the strips under `base`, logging absent ones at debug level.
fn load_strip(
    base: &Path,
    animations: &[&str],
    variant: &str,
    loader: &impl FrameLoader,
) -> (Option<RgbaImage>, usize, Vec<LoadFailure>) {
    let loaded = load_layer(
        &animation_paths(base, animations, variant),
        Path::new(""),
        loader,
    );
    for failure in &loaded.failures {
        if failure.is_not_found() {
            debug!(path = %failure.path.display(), "no strip");
        } else {
            warn!("Failed to load {failure}");
        }
    }
    (loaded.image, loaded.sources.len(), loaded.failures)
}

/// Assemble a character sheet from the library under `spritesheets`.
#[tracing::instrument(skip_all, fields(character = %spec.name, sex = %spec.sex))]
pub fn create_character(
    spec: &CharacterSpec,
    spritesheets: &Path,
    loader: &impl FrameLoader,
) -> Result<CharacterSheet, CharacterError> {
    let animations = spec.animations();

    let body_base = component_base(spritesheets, "body", "bodies", spec.sex);
    let (body, _, failures) = load_strip(&body_base, &animations, &spec.body_variant, loader);
    let Some(body) = body else {
        return Err(CharacterError::MissingBody {
            sex: spec.sex,
            variant: spec.body_variant.clone(),
            failures,
        });
    };

    let size = Dimensions::of(&body);
    let mut compositor = Compositor::new(CanvasStrategy::Fixed {
        width: size.width,
        height: size.height,
    });
    compositor.add_layer(&body);

    let mut components = Vec::with_capacity(spec.components.len());
    for (component_type, details) in &spec.components {
        let (Some(style), Some(variant)) = (&details.style, &details.variant) else {
            components.push(ComponentOutcome::Skipped {
                component: component_type.clone(),
                reason: "style or variant missing".to_string(),
            });
            continue;
        };

        let base = component_base(spritesheets, component_type, style, spec.sex);
        let (strip, frames, _) = load_strip(&base, &animations, variant, loader);
        match strip {
            Some(strip) => {
                compositor.add_layer(&strip);
                components.push(ComponentOutcome::Applied {
                    component: component_type.clone(),
                    frames,
                });
            }
            None => {
                warn!("No frames found for {component_type} {style} {variant}");
                components.push(ComponentOutcome::Skipped {
                    component: component_type.clone(),
                    reason: format!("no frames found for {style} {variant}"),
                });
            }
        }
    }

    Ok(CharacterSheet {
        image: compositor.finish(),
        components,
    })
}
