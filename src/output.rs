//! CLI output formatting.
//!
//! Output leads with what was produced (the output file) and puts how it was
//! built on indented lines below it. Warnings about skipped layers also go to
//! the log on stderr; the lines here are the user-facing record on stdout.
//!
//! # Output Format
//!
//! ## Render
//!
//! ```text
//! arms_steel_male.png (832x1344, 3 layers)
//!     ! layer_2: skipped, arms/plate/male/steel.png: file not found
//! arms_gold_male.png: cached
//! arms_gold_child.png: FAILED Sex 'child' not supported in definition arms
//!
//! Rendered 1, cached 1, failed 1
//! Cache: 1 cached, 1 rendered (2 total)
//! ```
//!
//! ## Inspect
//!
//! ```text
//! arms_armour
//!     Variants: steel, gold
//!     Sexes: male, female
//!     Animations: spellcast, thrust, walk, slash, shoot, hurt, watering
//!     001 male: arms/plate/male/
//!         female: arms/plate/female/
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::compose::{Composite, LayerOutcome, SkipReason};
use crate::definition::{DefinitionError, SheetDefinition};
use crate::render::{RenderEvent, RenderSummary};
use std::path::PathBuf;

// ============================================================================
// Render
// ============================================================================

/// Format one progress event of a render run.
pub fn format_render_event(event: &RenderEvent) -> Vec<String> {
    match event {
        RenderEvent::Rendered {
            output,
            dimensions,
            layers,
            diagnostics,
        } => {
            let mut lines = vec![format!(
                "{} ({}, {} {})",
                output,
                dimensions,
                layers,
                if *layers == 1 { "layer" } else { "layers" }
            )];
            lines.extend(diagnostics.iter().map(|d| format!("    ! {}", d)));
            lines
        }
        RenderEvent::Cached {
            output,
            copied_from: None,
        } => vec![format!("{}: cached", output)],
        RenderEvent::Cached {
            output,
            copied_from: Some(source),
        } => vec![format!("{}: copied from {}", output, source)],
        RenderEvent::Failed { item, error } => vec![format!("{}: FAILED {}", item, error)],
    }
}

pub fn format_render_summary(summary: &RenderSummary) -> Vec<String> {
    vec![
        String::new(),
        format!(
            "Rendered {}, cached {}, failed {}",
            summary.written, summary.cached, summary.failed
        ),
        format!("Cache: {}", summary.cache_stats),
    ]
}

pub fn print_render_event(event: &RenderEvent) {
    for line in format_render_event(event) {
        println!("{}", line);
    }
}

pub fn print_render_summary(summary: &RenderSummary) {
    for line in format_render_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Compose
// ============================================================================

/// Per-layer account of a single composition.
pub fn format_composite(output: &str, composite: &Composite) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({}, {} of {} layers)",
        output,
        composite.dimensions(),
        composite.applied_layers(),
        composite.layers.len()
    )];
    for outcome in &composite.layers {
        let index = outcome.layer();
        match outcome {
            LayerOutcome::Applied {
                sources, missing, ..
            } => {
                lines.push(format!("    {:03} applied", index));
                for source in sources {
                    lines.push(format!("        Source: {}", source.display()));
                }
                for failure in missing {
                    lines.push(format!("        Missing: {}", failure));
                }
            }
            LayerOutcome::Skipped {
                reason: SkipReason::NotForSex,
                ..
            } => lines.push(format!("    {:03} not for this body type", index)),
            LayerOutcome::Skipped {
                reason: SkipReason::Unresolved(unresolved),
                ..
            } => lines.push(format!("    {:03} skipped: {}", index, unresolved.reason)),
            LayerOutcome::Skipped {
                reason: SkipReason::NothingLoaded(failures),
                ..
            } => {
                lines.push(format!("    {:03} skipped", index));
                for failure in failures {
                    lines.push(format!("        Missing: {}", failure));
                }
            }
        }
    }
    lines
}

pub fn print_composite(output: &str, composite: &Composite) {
    for line in format_composite(output, composite) {
        println!("{}", line);
    }
}

// ============================================================================
// Inspect / check
// ============================================================================

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Describe a definition: variants, body types, animations and layer paths.
pub fn format_definition(definition: &SheetDefinition) -> Vec<String> {
    let mut lines = vec![definition.name.clone()];
    lines.push(format!("    Variants: {}", join(&definition.variants)));
    lines.push(format!("    Sexes: {}", join(definition.required_sexes())));
    lines.push(format!("    Animations: {}", join(definition.animations())));
    if definition.template {
        lines.push("    Template: yes".to_string());
    }
    for (old, new) in &definition.replace_in_path {
        lines.push(format!("    Rewrite: {} \u{2192} {}", old, new));
    }

    for (i, layer) in definition.layers.iter().enumerate() {
        let mut first = true;
        for sex in layer.sexes() {
            let path = layer.path_for(sex).unwrap_or_default();
            if first {
                lines.push(format!("    {:03} {}: {}", i + 1, sex, path));
                first = false;
            } else {
                lines.push(format!("        {}: {}", sex, path));
            }
        }
        if first {
            lines.push(format!("    {:03} (empty)", i + 1));
        }
    }
    lines
}

pub fn print_definition(definition: &SheetDefinition) {
    for line in format_definition(definition) {
        println!("{}", line);
    }
}

/// One line per definition file, then a count of the bad ones.
pub fn format_check_results(
    results: &[(PathBuf, Result<SheetDefinition, DefinitionError>)],
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut invalid = 0;
    for (path, result) in results {
        match result {
            Ok(definition) => {
                let mut line = format!(
                    "ok   {} ({} layers, {} variants)",
                    definition.name,
                    definition.layers.len(),
                    definition.variants.len()
                );
                if definition.variants.is_empty() {
                    line.push_str(" warning: no variants");
                }
                lines.push(line);
            }
            Err(e) => {
                invalid += 1;
                lines.push(format!("FAIL {}: {}", path.display(), e));
            }
        }
    }
    lines.push(format!(
        "{} definitions checked, {} invalid",
        results.len(),
        invalid
    ));
    lines
}

pub fn print_check_results(results: &[(PathBuf, Result<SheetDefinition, DefinitionError>)]) {
    for line in format_check_results(results) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
