//! Sheet definitions: the JSON documents that describe how a sprite sheet is
//! layered.
//!
//! A definition lists the variants it can be rendered in and, per layer, the
//! base asset path for each body type ("sex" in the asset library's
//! vocabulary):
//!
//! ```json
//! {
//!   "name": "Plate arms",
//!   "variants": ["steel", "gold"],
//!   "template": true,
//!   "replace_in_path": { "/old/": "/new/" },
//!   "layer_1": { "zPos": 35, "male": "arms/plate/${size}/male/", "female": "" },
//!   "layer_2": { "male": "arms/plate/trim/male/" }
//! }
//! ```
//!
//! ## Layer enumeration
//!
//! Layers are read as `layer_1`, `layer_2`, ... and the first missing index
//! ends the sequence: a `layer_4` without a `layer_3` is never seen. Keys
//! other than the six body types inside a layer object (`zPos`,
//! `custom_animation`, ...) are ignored, as are unrelated top-level keys.
//!
//! ## Required body types
//!
//! A body type is selectable for a definition iff `layer_1` gives it a
//! non-empty path. Later layers may be empty for a body type; such layers are
//! skipped at composition time.

use crate::ordered;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Animation strips assumed when a definition doesn't list its own.
pub const DEFAULT_ANIMATIONS: &[&str] = &[
    "spellcast",
    "thrust",
    "walk",
    "slash",
    "shoot",
    "hurt",
    "watering",
];

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed definition: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown sex '{0}' (expected one of male, female, teen, child, muscular, pregnant)")]
pub struct UnknownSex(pub String);

/// Body type an asset is drawn for.
///
/// Declaration order is the canonical enumeration order used everywhere a
/// list of body types is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Teen,
    Child,
    Muscular,
    Pregnant,
}

impl Sex {
    pub const ALL: [Sex; 6] = [
        Sex::Male,
        Sex::Female,
        Sex::Teen,
        Sex::Child,
        Sex::Muscular,
        Sex::Pregnant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Teen => "teen",
            Sex::Child => "child",
            Sex::Muscular => "muscular",
            Sex::Pregnant => "pregnant",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = UnknownSex;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sex::ALL
            .into_iter()
            .find(|sex| sex.as_str() == s)
            .ok_or_else(|| UnknownSex(s.to_string()))
    }
}

/// One layer of a definition: the base asset path per body type.
///
/// Only non-empty paths are stored, so "absent" and "empty" read the same.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerSpec {
    paths: BTreeMap<Sex, String>,
}

impl LayerSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter; an empty path leaves the body type unset.
    pub fn with_path(mut self, sex: Sex, path: impl Into<String>) -> Self {
        let path = path.into();
        if path.is_empty() {
            self.paths.remove(&sex);
        } else {
            self.paths.insert(sex, path);
        }
        self
    }

    /// Base path for `sex`, or `None` when this layer doesn't apply to it.
    pub fn path_for(&self, sex: Sex) -> Option<&str> {
        self.paths.get(&sex).map(String::as_str)
    }

    /// Body types with a path, in enumeration order.
    pub fn sexes(&self) -> impl Iterator<Item = Sex> + '_ {
        self.paths.keys().copied()
    }

    fn from_value(index: usize, value: &Value) -> Result<Self, DefinitionError> {
        let object = value.as_object().ok_or_else(|| {
            DefinitionError::Malformed(format!("layer_{index} must be an object"))
        })?;

        let mut layer = LayerSpec::new();
        for sex in Sex::ALL {
            match object.get(sex.as_str()) {
                None | Some(Value::Null) => {}
                Some(Value::String(path)) => layer = layer.with_path(sex, path.as_str()),
                Some(other) => {
                    return Err(DefinitionError::Malformed(format!(
                        "layer_{index}.{sex} must be a string, got {other}"
                    )));
                }
            }
        }
        Ok(layer)
    }
}

/// A parsed sheet definition. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetDefinition {
    /// File stem when loaded from disk, otherwise the document's `name` key.
    pub name: String,
    pub variants: Vec<String>,
    /// Layers in index order; `layers[0]` is `layer_1`.
    pub layers: Vec<LayerSpec>,
    /// The definition's own animation list, if it has one.
    pub animations: Option<Vec<String>>,
    /// Whether layer paths carry `${key}` placeholders.
    pub template: bool,
    /// Literal `(old, new)` rewrites, in document order.
    pub replace_in_path: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct RawDefinition {
    variants: Option<Vec<String>>,
    animations: Option<Vec<String>>,
    template: Option<bool>,
    #[serde(default, deserialize_with = "ordered::deserialize")]
    replace_in_path: Vec<(String, String)>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

fn layer_key(index: usize) -> String {
    format!("layer_{index}")
}

impl SheetDefinition {
    /// Parse a definition from JSON text.
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let raw: RawDefinition = serde_json::from_str(json)?;

        let variants = raw.variants.ok_or_else(|| {
            DefinitionError::Malformed("missing required key 'variants'".to_string())
        })?;

        let layers = (1usize..)
            .map_while(|index| {
                raw.rest
                    .get(&layer_key(index))
                    .map(|value| LayerSpec::from_value(index, value))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if layers.is_empty() {
            return Err(DefinitionError::Malformed(
                "missing required key 'layer_1'".to_string(),
            ));
        }

        let name = raw
            .rest
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            name,
            variants,
            layers,
            animations: raw.animations,
            template: raw.template.unwrap_or(false),
            replace_in_path: raw.replace_in_path,
        })
    }

    /// Load a definition file. The definition is named after the file stem.
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut definition = Self::from_json(&content)?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            definition.name = stem.to_string();
        }
        Ok(definition)
    }

    /// Body types selectable for this definition, in enumeration order.
    pub fn required_sexes(&self) -> Vec<Sex> {
        match self.layers.first() {
            Some(base) => base.sexes().collect(),
            None => Vec::new(),
        }
    }

    pub fn supports_sex(&self, sex: Sex) -> bool {
        self.layers
            .first()
            .is_some_and(|base| base.path_for(sex).is_some())
    }

    /// Animation names in strip order: the definition's own or the defaults.
    pub fn animations(&self) -> Vec<&str> {
        match &self.animations {
            Some(own) => own.iter().map(String::as_str).collect(),
            None => DEFAULT_ANIMATIONS.to_vec(),
        }
    }

    pub fn is_valid_variant(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// Path of a named definition inside a definitions directory.
pub fn definition_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Load `<dir>/<name>.json`.
pub fn load_named(dir: &Path, name: &str) -> Result<SheetDefinition, DefinitionError> {
    SheetDefinition::load(&definition_path(dir, name))
}
