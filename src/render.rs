//! Config-driven render runs.
//!
//! [`render`] works through a [`RenderConfig`] in three passes, in this order:
//!
//! 1. `sprites`: one sheet each, written under its `output_name`
//! 2. `batch_jobs`: every variant × body type cell, written as
//!    `{definition}_{variant}_{sex}.png`
//! 3. `characters`: one sheet each, written as `{name}.png`
//!
//! Each definition file is read once per run no matter how many jobs use it.
//! Outputs whose inputs haven't changed are taken from the [cache](crate::cache);
//! the rest are composed in parallel on the rayon pool and written as PNG.
//!
//! Every output name is written by one job only; later jobs asking for the
//! same file fail.
//!
//! A failing item (missing definition, unsupported body type, unwritable
//! file) is reported and counted, never fatal: the run carries on with the
//! next one. Only an output directory that can't be created aborts the run.
//!
//! Progress is reported as [`RenderEvent`]s over an optional channel, in job
//! order, so a printer thread can stream them while the run continues.

use crate::cache::{self, CacheManifest, CacheStats};
use crate::character::{self, CharacterSpec};
use crate::compose::{self, CompositionOptions, Selection};
use crate::config::RenderConfig;
use crate::definition::{self, Sex, SheetDefinition};
use crate::imaging::{Dimensions, FrameLoader, RustBackend, save_png};
use crate::resolve::TemplateParams;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Could not create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Progress of a render run, one per output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// A sheet was composed and written.
    Rendered {
        output: String,
        dimensions: Dimensions,
        layers: usize,
        /// Layers and frames that were left out.
        diagnostics: Vec<String>,
    },
    /// The output was already up to date, or copied from an identical one.
    Cached {
        output: String,
        copied_from: Option<String>,
    },
    Failed { item: String, error: String },
}

#[derive(Debug, Default)]
pub struct RenderSummary {
    pub written: usize,
    pub cached: usize,
    pub failed: usize,
    pub cache_stats: CacheStats,
}

impl RenderSummary {
    pub fn total(&self) -> usize {
        self.written + self.cached + self.failed
    }
}

/// File name of one batch cell.
pub fn batch_output_name(definition: &str, variant: &str, sex: Sex) -> String {
    format!("{definition}_{variant}_{sex}.png")
}

/// Render everything `config` asks for with the PNG backend.
pub fn render(
    config: &RenderConfig,
    use_cache: bool,
    events: Option<Sender<RenderEvent>>,
) -> Result<RenderSummary, RenderError> {
    render_with_loader(config, use_cache, events, &RustBackend::new())
}

/// Render with a specific frame loader (allows testing with a mock).
pub fn render_with_loader<L: FrameLoader>(
    config: &RenderConfig,
    use_cache: bool,
    events: Option<Sender<RenderEvent>>,
    loader: &L,
) -> Result<RenderSummary, RenderError> {
    let output_dir = config.output_dir.as_path();
    std::fs::create_dir_all(output_dir).map_err(|source| RenderError::OutputDir {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let context = Context {
        definitions: load_definitions(config),
        options: config.composition_options(),
        definitions_dir: &config.sheet_definitions_path,
        spritesheets: &config.spritesheets_path,
        output_dir,
    };

    let mut run = Run {
        output_dir,
        manifest: if use_cache {
            CacheManifest::load(output_dir)
        } else {
            CacheManifest::empty()
        },
        summary: RenderSummary::default(),
        events,
    };

    // Cache lookups and failures are settled in job order; the rest is
    // composed in parallel afterwards.
    let mut pending = Vec::new();
    for job in jobs(config, &context, &mut run) {
        let keys = match context.cache_keys(&job) {
            Ok(keys) => keys,
            Err(error) => {
                run.fail(job.output().to_string(), error);
                continue;
            }
        };
        if !run.try_cached(job.output(), &keys) {
            pending.push((job, keys));
        }
    }

    let results: Vec<Result<Written, String>> = pending
        .par_iter()
        .map(|(job, _)| context.execute(job, loader))
        .collect();

    for ((job, keys), result) in pending.into_iter().zip(results) {
        match result {
            Ok(written) => run.written(job.output().to_string(), keys, written),
            Err(error) => run.fail(job.output().to_string(), error),
        }
    }

    if let Err(e) = run.manifest.save(output_dir) {
        warn!("Could not save cache manifest: {e}");
    }
    Ok(run.summary)
}

/// One output of a run.
enum Job<'c> {
    Sheet {
        definition: &'c str,
        variant: String,
        sex: Sex,
        params: Option<&'c TemplateParams>,
        output: String,
    },
    Character {
        spec: &'c CharacterSpec,
        output: String,
    },
}

impl Job<'_> {
    fn output(&self) -> &str {
        match self {
            Job::Sheet { output, .. } | Job::Character { output, .. } => output,
        }
    }
}

/// Sprites, then batch cells, then characters.
///
/// Items that can't become a job fail here: a sex that isn't a body type, a
/// batch whose definition can't be loaded (its cells can't be listed), and
/// any job whose output an earlier job already writes.
fn jobs<'c>(config: &'c RenderConfig, context: &Context<'c>, run: &mut Run) -> Vec<Job<'c>> {
    let mut jobs = Vec::new();

    for sprite in &config.sprites {
        match sprite.parsed_sex() {
            Ok(sex) => jobs.push(Job::Sheet {
                definition: &sprite.definition_name,
                variant: sprite.variant.clone(),
                sex,
                params: sprite.template_params.as_ref(),
                output: sprite.output_name.clone(),
            }),
            Err(e) => run.fail(sprite.output_name.clone(), e.to_string()),
        }
    }

    for job in &config.batch_jobs {
        let definition = match context.definition(&job.definition_name) {
            Ok(definition) => definition,
            Err(error) => {
                run.fail(job.definition_name.clone(), error);
                continue;
            }
        };
        let (sexes, unknown) = match job.parsed_sexes() {
            Some((known, unknown)) => (Some(known), unknown),
            None => (None, Vec::new()),
        };
        let cells = match &sexes {
            // only unknown names were asked for
            Some(known) if known.is_empty() => Vec::new(),
            _ => compose::batch_cells(definition, job.variants.as_deref(), sexes.as_deref()),
        };
        for (variant, sex) in cells {
            jobs.push(Job::Sheet {
                definition: &job.definition_name,
                output: batch_output_name(&job.definition_name, &variant, sex),
                variant,
                sex,
                params: job.template_params.as_ref(),
            });
        }
        for unknown_sex in &unknown {
            for variant in compose::batch_variants(definition, job.variants.as_deref()) {
                run.fail(
                    format!("{}_{}_{}.png", job.definition_name, variant, unknown_sex.0),
                    unknown_sex.to_string(),
                );
            }
        }
    }

    for spec in &config.characters {
        jobs.push(Job::Character {
            spec,
            output: format!("{}.png", spec.name),
        });
    }

    let mut claimed = HashSet::new();
    jobs.retain(|job| {
        if claimed.insert(job.output().to_string()) {
            true
        } else {
            run.fail(
                job.output().to_string(),
                "output is already written by an earlier job".to_string(),
            );
            false
        }
    });
    jobs
}

fn load_definitions(config: &RenderConfig) -> HashMap<&str, Result<SheetDefinition, String>> {
    let mut loaded = HashMap::new();
    let names = config
        .sprites
        .iter()
        .map(|s| s.definition_name.as_str())
        .chain(config.batch_jobs.iter().map(|j| j.definition_name.as_str()));
    for name in names {
        loaded.entry(name).or_insert_with(|| {
            definition::load_named(&config.sheet_definitions_path, name).map_err(|e| {
                warn!(definition = name, "Could not load definition: {e}");
                e.to_string()
            })
        });
    }
    loaded
}

struct CacheKeys {
    source: String,
    params: String,
}

/// What a finished output looked like.
struct Written {
    dimensions: Dimensions,
    layers: usize,
    diagnostics: Vec<String>,
}

/// Read-only state shared by the parallel workers.
struct Context<'c> {
    definitions: HashMap<&'c str, Result<SheetDefinition, String>>,
    options: CompositionOptions,
    definitions_dir: &'c Path,
    spritesheets: &'c Path,
    output_dir: &'c Path,
}

impl Context<'_> {
    fn definition(&self, name: &str) -> Result<&SheetDefinition, String> {
        match self.definitions.get(name) {
            Some(Ok(definition)) => Ok(definition),
            Some(Err(error)) => Err(error.clone()),
            None => Err(format!("definition {name} was not loaded")),
        }
    }

    /// Hashes for a job, after checking it can be rendered at all.
    fn cache_keys(&self, job: &Job<'_>) -> Result<CacheKeys, String> {
        match job {
            Job::Sheet {
                definition,
                variant,
                sex,
                params,
                ..
            } => {
                let def = self.definition(definition)?;
                let selection = Selection::new(variant, *sex).with_params(*params);
                compose::check_selection(def, &selection).map_err(|e| e.to_string())?;

                let mut files = vec![definition::definition_path(self.definitions_dir, definition)];
                for planned in compose::plan_layers(def, &selection, &self.options) {
                    files.extend(planned.asset_paths(&self.options.asset_root));
                }
                Ok(CacheKeys {
                    source: cache::hash_sources(&files),
                    params: cache::hash_sheet_params(&selection, &self.options),
                })
            }
            Job::Character { spec, .. } => Ok(CacheKeys {
                source: cache::hash_sources(&character::candidate_paths(spec, self.spritesheets)),
                params: cache::hash_character_params(spec),
            }),
        }
    }

    fn execute(&self, job: &Job<'_>, loader: &impl FrameLoader) -> Result<Written, String> {
        let path = self.output_dir.join(job.output());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let written = match job {
            Job::Sheet {
                definition,
                variant,
                sex,
                params,
                ..
            } => {
                let def = self.definition(definition)?;
                let selection = Selection::new(variant, *sex).with_params(*params);
                let composite = compose::compose_one(def, selection, &self.options, loader)
                    .map_err(|e| e.to_string())?;
                save_png(&composite.image, &path).map_err(|e| e.to_string())?;
                Written {
                    dimensions: composite.dimensions(),
                    layers: composite.applied_layers(),
                    diagnostics: composite.diagnostics(),
                }
            }
            Job::Character { spec, .. } => {
                let sheet = character::create_character(spec, self.spritesheets, loader)
                    .map_err(|e| e.to_string())?;
                save_png(&sheet.image, &path).map_err(|e| e.to_string())?;
                let applied = sheet
                    .components
                    .iter()
                    .filter(|c| matches!(c, character::ComponentOutcome::Applied { .. }))
                    .count();
                Written {
                    dimensions: sheet.dimensions(),
                    layers: applied + 1,
                    diagnostics: sheet
                        .components
                        .iter()
                        .filter_map(|c| match c {
                            character::ComponentOutcome::Skipped { component, reason } => {
                                Some(format!("{component}: {reason}"))
                            }
                            character::ComponentOutcome::Applied { .. } => None,
                        })
                        .collect(),
                }
            }
        };
        Ok(written)
    }
}

/// Mutable bookkeeping of a run; only touched from the calling thread.
struct Run<'a> {
    output_dir: &'a Path,
    manifest: CacheManifest,
    summary: RenderSummary,
    events: Option<Sender<RenderEvent>>,
}

impl Run<'_> {
    fn emit(&self, event: RenderEvent) {
        if let Some(tx) = &self.events {
            // A printer that went away doesn't stop the run.
            tx.send(event).ok();
        }
    }

    fn fail(&mut self, item: String, error: String) {
        warn!(item = %item, "{error}");
        self.summary.failed += 1;
        self.emit(RenderEvent::Failed { item, error });
    }

    /// Serve `output` from the cache if possible.
    fn try_cached(&mut self, output: &str, keys: &CacheKeys) -> bool {
        let Some(stored) = self
            .manifest
            .find_cached(&keys.source, &keys.params, self.output_dir)
        else {
            return false;
        };

        if stored == output {
            self.summary.cache_stats.hit();
            self.summary.cached += 1;
            self.emit(RenderEvent::Cached {
                output: output.to_string(),
                copied_from: None,
            });
            return true;
        }

        match std::fs::copy(self.output_dir.join(&stored), self.output_dir.join(output)) {
            Ok(_) => {
                self.manifest.insert(
                    output.to_string(),
                    keys.source.clone(),
                    keys.params.clone(),
                );
                self.summary.cache_stats.copy();
                self.summary.cached += 1;
                self.emit(RenderEvent::Cached {
                    output: output.to_string(),
                    copied_from: Some(stored),
                });
                true
            }
            Err(e) => {
                warn!("Could not copy cached {stored} to {output}: {e}");
                false
            }
        }
    }

    fn written(&mut self, output: String, keys: CacheKeys, written: Written) {
        info!(output = %output, size = %written.dimensions, "wrote sheet");
        self.manifest
            .insert(output.clone(), keys.source, keys.params);
        self.summary.cache_stats.miss();
        self.summary.written += 1;
        self.emit(RenderEvent::Rendered {
            output,
            dimensions: written.dimensions,
            layers: written.layers,
            diagnostics: written.diagnostics,
        });
    }
}
