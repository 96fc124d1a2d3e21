//! Render configuration.
//!
//! A render run is described by one JSON file. Every key is optional;
//! defaults are shown below:
//!
//! ```json
//! {
//!   "output_dir": "output",
//!   "sheet_definitions_path": "sheet_definitions",
//!   "asset_root": ".",
//!   "spritesheets_path": "spritesheets",
//!   "canvas": { "mode": "fixed", "width": 832, "height": 1344 },
//!   "layout": "single",
//!   "processing": { "max_processes": null },
//!   "sprites": [
//!     { "definition_name": "arms_armour", "variant": "steel", "sex": "male",
//!       "output_name": "arms_steel_male.png", "template_params": { "size": "big" } }
//!   ],
//!   "batch_jobs": [
//!     { "definition_name": "arms_armour", "variants": ["steel", "gold"], "sexes": ["male"] }
//!   ],
//!   "characters": [
//!     { "name": "warrior", "sex": "male", "body_variant": "light",
//!       "components": { "hair": { "style": "long", "variant": "black" } } }
//!   ]
//! }
//! ```
//!
//! - `canvas` may also be `{ "mode": "adaptive" }`: the sheet takes the size of
//!   its layers instead of a fixed grid.
//! - `layout` is `"single"` (`<base><variant>.png`) or `"per_animation"`
//!   (`<base>/<animation>/<variant>.png`).
//! - `variants` / `sexes` of a batch job default to every variant of the
//!   definition and every body type its first layer supports.
//! - A `sex` that isn't a body type fails that sprite or batch cell when the
//!   config is rendered; the rest of the config still renders.
//!
//! Unknown keys are rejected to catch typos early.

use crate::character::CharacterSpec;
use crate::compose::CompositionOptions;
use crate::definition::{Sex, UnknownSex};
use crate::imaging::CanvasStrategy;
use crate::resolve::{PathLayout, TemplateParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration for one render run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Where finished sheets are written.
    pub output_dir: PathBuf,
    /// Directory holding `<definition_name>.json` files.
    pub sheet_definitions_path: PathBuf,
    /// Directory that resolved layer paths are relative to.
    pub asset_root: PathBuf,
    /// Component library used for characters.
    pub spritesheets_path: PathBuf,
    pub canvas: CanvasStrategy,
    pub layout: PathLayout,
    pub processing: ProcessingConfig,
    pub sprites: Vec<SpriteJob>,
    pub batch_jobs: Vec<BatchJob>,
    pub characters: Vec<CharacterSpec>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            sheet_definitions_path: PathBuf::from("sheet_definitions"),
            asset_root: PathBuf::from("."),
            spritesheets_path: PathBuf::from("spritesheets"),
            canvas: CanvasStrategy::default(),
            layout: PathLayout::default(),
            processing: ProcessingConfig::default(),
            sprites: Vec::new(),
            batch_jobs: Vec::new(),
            characters: Vec::new(),
        }
    }
}

/// One explicitly named sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpriteJob {
    pub definition_name: String,
    pub variant: String,
    /// Body type name; an unknown one fails only this job.
    pub sex: String,
    /// File name inside `output_dir`, extension included.
    pub output_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_params: Option<TemplateParams>,
}

/// Every variant × body type combination of one definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchJob {
    pub definition_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sexes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_params: Option<TemplateParams>,
}

impl SpriteJob {
    pub fn parsed_sex(&self) -> Result<Sex, UnknownSex> {
        self.sex.parse()
    }
}

impl BatchJob {
    /// Requested body types split into the known ones and the names that
    /// aren't body types at all. `None` when the job asks for every body type.
    pub fn parsed_sexes(&self) -> Option<(Vec<Sex>, Vec<UnknownSex>)> {
        let names = self.sexes.as_ref().filter(|names| !names.is_empty())?;
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for name in names {
            match name.parse::<Sex>() {
                Ok(sex) => known.push(sex),
                Err(e) => unknown.push(e),
            }
        }
        Some((known, unknown))
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel compositing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

impl RenderConfig {
    /// Read and validate a config file. Relative paths inside it are taken
    /// as-is (relative to the working directory).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let CanvasStrategy::Fixed { width, height } = self.canvas
            && (width == 0 || height == 0)
        {
            return Err(ConfigError::Validation(
                "canvas width and height must be non-zero".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        for (i, sprite) in self.sprites.iter().enumerate() {
            if sprite.definition_name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "sprites[{i}].definition_name must not be empty"
                )));
            }
            if sprite.output_name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "sprites[{i}].output_name must not be empty"
                )));
            }
        }
        for (i, job) in self.batch_jobs.iter().enumerate() {
            if job.definition_name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "batch_jobs[{i}].definition_name must not be empty"
                )));
            }
        }
        for (i, character) in self.characters.iter().enumerate() {
            if character.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "characters[{i}].name must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Composition settings shared by every sprite and batch job.
    pub fn composition_options(&self) -> CompositionOptions {
        CompositionOptions {
            canvas: self.canvas,
            layout: self.layout,
            asset_root: self.asset_root.clone(),
        }
    }
}

/// The stock configuration, pretty-printed, with one example of each job kind.
pub fn stock_config_json() -> String {
    let mut config = RenderConfig::default();
    config.sprites.push(SpriteJob {
        definition_name: "arms_armour".to_string(),
        variant: "steel".to_string(),
        sex: Sex::Male.to_string(),
        output_name: "arms_armour_steel_male.png".to_string(),
        template_params: None,
    });
    config.batch_jobs.push(BatchJob {
        definition_name: "arms_armour".to_string(),
        variants: Some(vec!["steel".to_string(), "gold".to_string()]),
        sexes: Some(vec![Sex::Male.to_string(), Sex::Female.to_string()]),
        template_params: None,
    });
    config.characters.push(
        CharacterSpec::new("warrior", Sex::Male, "light").with_component(
            "hair",
            crate::character::ComponentSpec::new("long", "black"),
        ),
    );
    // RenderConfig is plain data; serializing it can't fail.
    serde_json::to_string_pretty(&config).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = RenderConfig::from_json("{}").unwrap();
        assert_eq!(config, RenderConfig::default());
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.canvas, CanvasStrategy::standard());
        assert_eq!(config.layout, PathLayout::Single);
    }

    #[test]
    fn parses_sprites_and_batch_jobs() {
        let config = RenderConfig::from_json(
            r#"{
                "output_dir": "out",
                "sheet_definitions_path": "defs",
                "sprites": [{
                    "definition_name": "arms_armour",
                    "variant": "steel",
                    "sex": "male",
                    "output_name": "a.png",
                    "template_params": {"size": "big"}
                }],
                "batch_jobs": [{"definition_name": "arms_armour", "sexes": ["female", "teen"]}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.sprites.len(), 1);
        assert_eq!(config.sprites[0].parsed_sex(), Ok(Sex::Male));
        assert_eq!(
            config.sprites[0]
                .template_params
                .as_ref()
                .and_then(|p| p.get("size"))
                .map(String::as_str),
            Some("big")
        );
        assert_eq!(config.batch_jobs[0].variants, None);
        assert_eq!(
            config.batch_jobs[0].parsed_sexes(),
            Some((vec![Sex::Female, Sex::Teen], vec![]))
        );
    }

    #[test]
    fn adaptive_canvas_and_per_animation_layout() {
        let config = RenderConfig::from_json(
            r#"{"canvas": {"mode": "adaptive"}, "layout": "per_animation", "asset_root": "lib"}"#,
        )
        .unwrap();
        let options = config.composition_options();
        assert_eq!(options.canvas, CanvasStrategy::Adaptive);
        assert_eq!(options.layout, PathLayout::PerAnimation);
        assert_eq!(options.asset_root, PathBuf::from("lib"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = RenderConfig::from_json(r#"{"ouput_dir": "typo"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn unknown_sex_parses_and_is_reported_per_job() {
        let config = RenderConfig::from_json(
            r#"{
                "sprites": [{"definition_name": "x", "variant": "v", "sex": "elf", "output_name": "a.png"}],
                "batch_jobs": [{"definition_name": "x", "sexes": ["male", "elf"]}]
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.sprites[0].parsed_sex(),
            Err(UnknownSex("elf".to_string()))
        );
        assert_eq!(
            config.batch_jobs[0].parsed_sexes(),
            Some((vec![Sex::Male], vec![UnknownSex("elf".to_string())]))
        );
    }

    #[test]
    fn empty_sex_list_means_every_body_type() {
        let job = BatchJob {
            definition_name: "x".to_string(),
            variants: None,
            sexes: Some(vec![]),
            template_params: None,
        };
        assert_eq!(job.parsed_sexes(), None);
    }

    #[test]
    fn zero_canvas_is_invalid() {
        let err = RenderConfig::from_json(r#"{"canvas": {"mode": "fixed", "width": 0, "height": 10}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn empty_output_name_is_invalid() {
        let err = RenderConfig::from_json(
            r#"{"sprites": [{"definition_name": "x", "variant": "v", "sex": "male", "output_name": ""}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("output_name")));
    }

    #[test]
    fn zero_processes_is_invalid() {
        let err = RenderConfig::from_json(r#"{"processing": {"max_processes": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn effective_threads_caps_at_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(10_000),
        };
        assert_eq!(effective_threads(&config), cores);
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn stock_config_round_trips() {
        let json = stock_config_json();
        let config = RenderConfig::from_json(&json).unwrap();
        assert_eq!(config.sprites.len(), 1);
        assert_eq!(config.batch_jobs.len(), 1);
        assert_eq!(config.characters[0].components[0].0, "hair");
    }
}
