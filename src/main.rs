use clap::{Parser, Subcommand};
use layersheet::compose::{self, CompositionOptions, Selection};
use layersheet::config::{self, RenderConfig};
use layersheet::definition::{self, Sex, SheetDefinition};
use layersheet::imaging::{CanvasStrategy, RustBackend, save_png};
use layersheet::output;
use layersheet::render::{self, RenderEvent};
use layersheet::resolve::{PathLayout, TemplateParams};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

/// Shared flags for commands that write sheets through the cache.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the output cache and render every sheet again
    #[arg(long)]
    no_cache: bool,
}

/// Where definitions and assets live, and how to lay out the canvas.
#[derive(clap::Args, Clone)]
struct SheetArgs {
    /// Directory of `<name>.json` sheet definitions
    #[arg(long, default_value = "sheet_definitions")]
    definitions: PathBuf,

    /// Directory layer paths are relative to
    #[arg(long, default_value = ".")]
    assets: PathBuf,

    /// Size the canvas from the layers instead of the 832x1344 grid
    #[arg(long)]
    adaptive: bool,

    /// Read one strip per animation (`<base>/<animation>/<variant>.png`)
    #[arg(long)]
    per_animation: bool,

    /// Template parameter for `${key}` placeholders (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
}

impl SheetArgs {
    fn options(&self) -> CompositionOptions {
        CompositionOptions {
            canvas: if self.adaptive {
                CanvasStrategy::Adaptive
            } else {
                CanvasStrategy::standard()
            },
            layout: if self.per_animation {
                PathLayout::PerAnimation
            } else {
                PathLayout::Single
            },
            asset_root: self.assets.clone(),
        }
    }

    fn template_params(&self) -> Option<TemplateParams> {
        if self.params.is_empty() {
            None
        } else {
            Some(self.params.iter().cloned().collect())
        }
    }
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

#[derive(Parser)]
#[command(name = "layersheet")]
#[command(about = "Composite layered sprite sheets from JSON sheet definitions")]
#[command(long_about = "\
Composite layered sprite sheets from JSON sheet definitions

A definition names its variants and lists numbered layers, each with an
asset path per body type. Layers are blended bottom to top:

  sheet_definitions/arms_armour.json
  {
    \"variants\": [\"steel\", \"gold\"],
    \"layer_1\": { \"male\": \"arms/plate/male/\", \"female\": \"arms/plate/female/\" },
    \"layer_2\": { \"male\": \"arms/trim/male/\" }
  }

  layersheet compose arms_armour steel male -o arms.png
    → arms/plate/male/steel.png + arms/trim/male/steel.png → arms.png

Body types: male, female, teen, child, muscular, pregnant.

Run 'layersheet gen-config' to print a render config with every option.")]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every sprite, batch job and character in a config file
    Render {
        /// Render config (JSON)
        config: PathBuf,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Composite one sheet
    Compose {
        /// Definition name (file stem in the definitions directory)
        definition: String,
        variant: String,
        sex: Sex,
        /// Output PNG
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        sheet: SheetArgs,
    },
    /// Composite every variant × body type of a definition
    Batch {
        /// Definition name (file stem in the definitions directory)
        definition: String,
        /// Limit to these variants (repeatable; default all)
        #[arg(long = "variant")]
        variants: Vec<String>,
        /// Limit to these body types (repeatable; default all the definition supports)
        #[arg(long = "sex")]
        sexes: Vec<Sex>,
        /// Directory for `<definition>_<variant>_<sex>.png` files
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        #[command(flatten)]
        sheet: SheetArgs,
    },
    /// Describe a definition file
    Inspect {
        definition: PathBuf,
    },
    /// Validate every definition in a directory
    Check {
        #[arg(long, default_value = "sheet_definitions")]
        definitions: PathBuf,
    },
    /// Print a stock render config with one job of each kind
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Render { config, cache } => {
            let config = RenderConfig::load(&config)?;
            init_thread_pool(&config.processing);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_render_event(&event);
                }
            });
            let summary = render::render(&config, !cache.no_cache, Some(tx))?;
            printer.join().map_err(|_| "output printer panicked")?;
            output::print_render_summary(&summary);
            if summary.failed > 0 {
                return Err(format!("{} of {} outputs failed", summary.failed, summary.total()).into());
            }
        }
        Command::Compose {
            definition,
            variant,
            sex,
            output: out_path,
            sheet,
        } => {
            let definition = definition::load_named(&sheet.definitions, &definition)?;
            let params = sheet.template_params();
            let selection = Selection::new(&variant, sex).with_params(params.as_ref());
            let composite =
                compose::compose_one(&definition, selection, &sheet.options(), &RustBackend::new())?;
            if let Some(parent) = out_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            save_png(&composite.image, &out_path)?;
            output::print_composite(&out_path.display().to_string(), &composite);
        }
        Command::Batch {
            definition,
            variants,
            sexes,
            output_dir,
            sheet,
        } => {
            let definition = definition::load_named(&sheet.definitions, &definition)?;
            init_thread_pool(&config::ProcessingConfig::default());
            std::fs::create_dir_all(&output_dir)?;

            let params = sheet.template_params();
            let cells = compose::compose_batch(
                &definition,
                Some(variants.as_slice()),
                Some(sexes.as_slice()),
                params.as_ref(),
                &sheet.options(),
                &RustBackend::new(),
            );

            let mut failed = 0;
            for cell in cells {
                let name = render::batch_output_name(&definition.name, &cell.variant, cell.sex);
                let written = cell.result.map_err(|e| e.to_string()).and_then(|composite| {
                    save_png(&composite.image, &output_dir.join(&name))
                        .map(|()| composite)
                        .map_err(|e| e.to_string())
                });
                let event = match written {
                    Ok(composite) => RenderEvent::Rendered {
                        output: name,
                        dimensions: composite.dimensions(),
                        layers: composite.applied_layers(),
                        diagnostics: composite.diagnostics(),
                    },
                    Err(error) => {
                        failed += 1;
                        RenderEvent::Failed { item: name, error }
                    }
                };
                output::print_render_event(&event);
            }
            if failed > 0 {
                return Err(format!("{failed} sheets failed").into());
            }
        }
        Command::Inspect { definition } => {
            let definition = SheetDefinition::load(&definition)?;
            output::print_definition(&definition);
        }
        Command::Check { definitions } => {
            println!("==> Checking {}", definitions.display());
            let mut results = Vec::new();
            for entry in WalkDir::new(&definitions).sort_by_file_name() {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "json") {
                    results.push((path.to_path_buf(), SheetDefinition::load(path)));
                }
            }
            output::print_check_results(&results);
            let invalid = results.iter().filter(|(_, r)| r.is_err()).count();
            if invalid > 0 {
                return Err(format!("{invalid} invalid definitions").into());
            }
        }
        Command::GenConfig => {
            println!("{}", config::stock_config_json());
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays the command's own output.
fn init_logging(verbose: u8) -> Result<(), Box<dyn std::error::Error>> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
