//! Asset path resolution.
//!
//! Turns a layer's base path into the concrete file path(s) to load for a
//! given body type and variant. Pure string work: nothing here touches the
//! filesystem, so a missing asset only shows up later as a load failure.
//!
//! Resolution runs in a fixed order:
//!
//! 1. look up the layer's base path for the body type (absent = skip)
//! 2. `${key}` template substitution, when the definition is a template and
//!    parameters were supplied (unknown placeholders stay verbatim)
//! 3. literal `replace_in_path` rewrites, in document order
//! 4. variant suffix, shaped by the [`PathLayout`]:
//!
//! ```text
//! Single:        arms/plate/male/ + gold.png     → arms/plate/male/gold.png
//! PerAnimation:  arms/plate/male/walk/gold.png, arms/plate/male/slash/gold.png, ...
//! ```

use crate::definition::{LayerSpec, Sex, SheetDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Values for `${key}` placeholders.
pub type TemplateParams = BTreeMap<String, String>;

/// How a resolved base path turns into image files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathLayout {
    /// One full sheet per layer: `base + variant + ".png"`.
    #[default]
    Single,
    /// One strip per animation: `base/<animation>/<variant>.png`.
    PerAnimation,
}

/// One per-animation frame strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePath {
    pub animation: String,
    pub path: PathBuf,
}

/// Outcome of resolving one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The layer has no asset for this body type.
    Skip,
    Single(PathBuf),
    PerAnimation {
        frames: Vec<FramePath>,
        /// `base/<variant>.png`, tried when none of the frames load.
        combined: PathBuf,
    },
}

impl Resolution {
    /// Every path this resolution may load, frames first.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Resolution::Skip => Vec::new(),
            Resolution::Single(path) => vec![path.as_path()],
            Resolution::PerAnimation { frames, combined } => frames
                .iter()
                .map(|f| f.path.as_path())
                .chain(std::iter::once(combined.as_path()))
                .collect(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("layer_{layer} ({sex}) could not be resolved: {reason}")]
pub struct UnresolvedLayer {
    pub layer: usize,
    pub sex: Sex,
    pub reason: String,
}

/// Replace every `${key}` with its value. Placeholders without a value are
/// left untouched.
pub fn substitute_template(path: &str, params: &TemplateParams) -> String {
    params.iter().fold(path.to_string(), |acc, (key, value)| {
        acc.replace(&format!("${{{key}}}"), value)
    })
}

/// Apply literal `(old, new)` rewrites one after another. A rule with an
/// empty `old` matches nothing and is skipped.
pub fn apply_replacements(path: &str, replacements: &[(String, String)]) -> String {
    replacements
        .iter()
        .filter(|(old, new)| {
            if old.is_empty() {
                debug!(path, replacement = %new, "ignoring rewrite with an empty pattern");
            }
            !old.is_empty()
        })
        .fold(path.to_string(), |acc, (old, new)| acc.replace(old, new))
}

/// Base directory of a character component: `root/<type>/<style>/<sex>`.
pub fn component_base(root: &Path, component_type: &str, style: &str, sex: Sex) -> PathBuf {
    root.join(component_type).join(style).join(sex.as_str())
}

/// Frame strip paths under `base`, one per animation, plus the combined
/// fallback sheet.
pub fn animation_paths(base: &Path, animations: &[&str], variant: &str) -> Resolution {
    let file_name = format!("{variant}.png");
    Resolution::PerAnimation {
        frames: animations
            .iter()
            .map(|animation| FramePath {
                animation: (*animation).to_string(),
                path: base.join(animation).join(&file_name),
            })
            .collect(),
        combined: base.join(&file_name),
    }
}

/// Resolves the layers of one definition for one set of template parameters.
pub struct Resolver<'a> {
    definition: &'a SheetDefinition,
    params: Option<&'a TemplateParams>,
    layout: PathLayout,
}

impl<'a> Resolver<'a> {
    pub fn new(
        definition: &'a SheetDefinition,
        params: Option<&'a TemplateParams>,
        layout: PathLayout,
    ) -> Self {
        Self {
            definition,
            params,
            layout,
        }
    }

    /// Base path after template substitution and rewrites, before the
    /// variant suffix. `None` when the layer doesn't apply to `sex`.
    pub fn base_path(&self, layer: &LayerSpec, sex: Sex) -> Option<String> {
        let raw = layer.path_for(sex)?;
        let templated = match self.params {
            Some(params) if self.definition.template => substitute_template(raw, params),
            _ => raw.to_string(),
        };
        Some(apply_replacements(
            &templated,
            &self.definition.replace_in_path,
        ))
    }

    /// Resolve layer `index` (1-based) for a body type and variant.
    pub fn resolve(
        &self,
        index: usize,
        layer: &LayerSpec,
        sex: Sex,
        variant: &str,
    ) -> Result<Resolution, UnresolvedLayer> {
        let unresolved = |reason: &str| UnresolvedLayer {
            layer: index,
            sex,
            reason: reason.to_string(),
        };

        let Some(base) = self.base_path(layer, sex) else {
            return Ok(Resolution::Skip);
        };
        if base.is_empty() {
            return Err(unresolved("path is empty after substitution"));
        }

        match self.layout {
            PathLayout::Single => Ok(Resolution::Single(PathBuf::from(format!(
                "{base}{variant}.png"
            )))),
            PathLayout::PerAnimation => {
                let animations = self.definition.animations();
                if animations.is_empty() {
                    return Err(unresolved("definition lists no animations"));
                }
                Ok(animation_paths(Path::new(&base), &animations, variant))
            }
        }
    }
}
