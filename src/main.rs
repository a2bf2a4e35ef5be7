use clap::{Parser, Subcommand};
use rayon::prelude::*;
use shrinker::config::{self, EditorConfig};
use shrinker::export::{ExportJob, export_file_name, export_image};
use shrinker::imaging::{
    self, Filter, FilterKind, FilterParseError, OutputFormat, Quality, ResizeStrategy,
    RustBackend, TransformParameters, restrict,
};
use shrinker::metadata::{self, MetadataTags};
use shrinker::output::{self, BatchItem};
use shrinker::session::{Preset, Session, SessionConfig};
use shrinker::sink::DirectorySink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Edit flags shared by `resize` and `preview`.
///
/// Applied in order: rotation, preset, explicit field overrides.
#[derive(clap::Args, Clone, Debug)]
struct EditArgs {
    /// Target width in pixels (empty derives from the source)
    #[arg(long)]
    width: Option<String>,

    /// Target height in pixels (empty derives from the source)
    #[arg(long)]
    height: Option<String>,

    /// Encoder quality, 0–100 (ignored for PNG)
    #[arg(long)]
    quality: Option<f32>,

    /// Output format: jpeg, webp or png
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Resize strategy: exact, fit or fill-crop
    #[arg(long)]
    strategy: Option<ResizeStrategy>,

    /// Rotation in degrees, a multiple of 90 (negative turns left)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    rotate: i32,

    /// Mirror horizontally
    #[arg(long)]
    flip: bool,

    /// Scale to a percentage of the source (also sets quality)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100), conflicts_with = "telegram")]
    percent: Option<u8>,

    /// Telegram sticker preset: 512×512 PNG, fit inside
    #[arg(long)]
    telegram: bool,

    /// Filter applied to the source first, e.g. `brightness=0.2` (repeatable)
    #[arg(long = "filter")]
    filters: Vec<String>,
}

impl EditArgs {
    /// Signed quarter turns, rejecting angles that are not multiples of 90.
    fn quarter_turns(&self) -> Result<i32, String> {
        if self.rotate % 90 != 0 {
            return Err(format!("rotation must be a multiple of 90, got {}", self.rotate));
        }
        Ok(self.rotate / 90)
    }

    fn preset(&self) -> Option<Preset> {
        if self.telegram {
            Some(Preset::Telegram)
        } else {
            self.percent.map(Preset::Percent)
        }
    }

    fn parse_filters(&self) -> Result<Vec<Filter>, FilterParseError> {
        self.filters.iter().map(|spec| spec.parse()).collect()
    }
}

#[derive(Parser)]
#[command(name = "shrinker")]
#[command(about = "Resize, preview and export photos")]
#[command(long_about = "\
Resize, preview and export photos

Width and height describe the final canvas after rotation. Non-digit
characters are stripped and values are capped at the configured ceiling;
an empty or zero field derives that side from the source.

Exports are named <prefix><yyyyMMdd_HHmmss>.<ext>. EXIF tags read from the
source are written next to the export as <name>.exif.json.

Run 'shrinker gen-config' to generate a documented shrinker.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resize and export images in parallel
    Resize {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(long, short, default_value = "resized")]
        out: PathBuf,

        /// Do not copy EXIF tags to the export
        #[arg(long)]
        strip_tags: bool,

        #[command(flatten)]
        edit: EditArgs,
    },
    /// Show the preview an edit produces, optionally exporting it
    Preview {
        input: PathBuf,

        /// Save the display preview as PNG
        #[arg(long)]
        save: Option<PathBuf>,

        /// Export the result into this directory
        #[arg(long)]
        export: Option<PathBuf>,

        #[command(flatten)]
        edit: EditArgs,
    },
    /// Apply filters to an image
    Filter {
        #[arg(required_unless_present = "list")]
        input: Option<PathBuf>,

        /// Output file; the extension picks the format
        #[arg(required_unless_present = "list")]
        output: Option<PathBuf>,

        /// Filter spec, e.g. `contrast=1.2` or `vignette=0.5,0.8` (repeatable)
        #[arg(long = "filter", short)]
        filters: Vec<String>,

        /// List available filters and their defaults
        #[arg(long)]
        list: bool,
    },
    /// Extract the dominant color palette
    Palette {
        input: PathBuf,

        /// Maximum number of colors (defaults to the config value)
        #[arg(long)]
        colors: Option<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print EXIF tags
    Exif {
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print a stock shrinker.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    debug!(path = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Command::Resize {
            inputs,
            out,
            strip_tags,
            edit,
        } => {
            let files = collect_inputs(&inputs)?;
            let filters = edit.parse_filters()?;
            edit.quarter_turns()?;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config::effective_threads(&config.processing))
                .build()?;
            let items: Vec<BatchItem> = pool.install(|| {
                files
                    .par_iter()
                    .map(|path| resize_one(path, &out, &edit, &filters, !strip_tags, &config))
                    .collect()
            });
            output::print_batch_output(&items);
        }
        Command::Preview {
            input,
            save,
            export,
            edit,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_time()
                .build()?;
            runtime.block_on(run_preview(&input, save, export, &edit, &config))?;
        }
        Command::Filter {
            input,
            output,
            filters,
            list,
        } => {
            if list {
                output::print_filter_list(&FilterKind::ALL);
                return Ok(());
            }
            let (Some(input), Some(output)) = (input, output) else {
                return Err("input and output are required".into());
            };
            let filters = filters
                .iter()
                .map(|spec| spec.parse())
                .collect::<Result<Vec<Filter>, _>>()?;
            let format = output_format_for(&output)?;
            let image = imaging::load_image(&input)?;
            let filtered = imaging::apply_filters(&image, &filters);
            let bytes = imaging::encode(&filtered, format, Quality::new(config.export.quality))?;
            std::fs::write(&output, &bytes)?;
            println!(
                "{} → {} ({})",
                input.display(),
                output.display(),
                output::format_bytes(bytes.len() as u64)
            );
        }
        Command::Palette {
            input,
            colors,
            json,
        } => {
            let image = imaging::load_image(&input)?;
            let colors = colors.unwrap_or(config.palette.colors);
            let swatches = imaging::generate_palette(&image, colors);
            if json {
                println!("{}", serde_json::to_string_pretty(&swatches)?);
            } else {
                output::print_palette(&swatches);
            }
        }
        Command::Exif { input, json } => {
            let tags = metadata::read_exif_tags(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                output::print_tags(&tags);
            }
        }
        Command::GenConfig => unreachable!("handled before config loading"),
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Expand directories (non-recursive) into supported image files, sorted.
fn collect_inputs(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && imaging::is_supported_input(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn output_format_for(path: &Path) -> Result<OutputFormat, String> {
    path.extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| format!("{}: missing file extension", path.display()))?
        .parse()
}

/// Parameters for a batch item: rotation, then preset, then overrides.
fn batch_params(
    edit: &EditArgs,
    source_dims: (u32, u32),
    config: &EditorConfig,
) -> TransformParameters {
    let mut params = TransformParameters {
        format: config.export.format,
        quality: config.export.quality as f32,
        ..TransformParameters::from_dimensions(source_dims.0, source_dims.1)
    };

    let turns = edit.quarter_turns().unwrap_or(0);
    if turns.rem_euclid(2) == 1 {
        std::mem::swap(&mut params.width, &mut params.height);
    }
    params.rotation = (turns * 90).rem_euclid(360);
    params.flipped = edit.flip;

    if let Some(planned) = edit
        .preset()
        .and_then(|preset| preset.plan(&params, Some(source_dims)))
    {
        params = planned;
    }

    let ceiling = config.limits.dimension_ceiling;
    if let Some(width) = &edit.width {
        params.width = restrict(width, ceiling);
    }
    if let Some(height) = &edit.height {
        params.height = restrict(height, ceiling);
    }
    if let Some(format) = edit.format {
        params.format = format;
    }
    if let Some(quality) = edit.quality {
        params.quality = quality.clamp(0.0, 100.0);
    }
    if let Some(strategy) = edit.strategy {
        params.strategy = strategy;
    }
    params
}

fn resize_one(
    path: &Path,
    out: &Path,
    edit: &EditArgs,
    filters: &[Filter],
    keep_tags: bool,
    config: &EditorConfig,
) -> BatchItem {
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let result = (|| -> Result<(shrinker::export::ExportReport, Option<String>), String> {
        let image = imaging::load_image(path).map_err(|e| e.to_string())?;
        let image = if filters.is_empty() {
            image
        } else {
            imaging::apply_filters(&image, filters)
        };
        let tags = keep_tags
            .then(|| {
                metadata::read_exif_tags(path)
                    .inspect_err(|e| {
                        warn!(file = %path.display(), error = %e, "Could not read EXIF")
                    })
                    .ok()
            })
            .flatten()
            .filter(|t: &MetadataTags| !t.is_empty());

        let params = batch_params(edit, (image.width(), image.height()), config);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{}_{}_", config.export.filename_prefix, stem);
        let job = ExportJob {
            source: Arc::new(image),
            file_name: export_file_name(&prefix, params.format, chrono::Local::now().naive_local()),
            params,
            tags,
        };

        let mut sink = DirectorySink::new(out);
        let outcome =
            export_image(&RustBackend::new(), &job, &mut sink).map_err(|e| e.to_string())?;
        let sidecar = (job.tags.is_some() && outcome.report.metadata_error.is_none())
            .then(|| metadata::sidecar_path(&sink.path_for(&job.file_name)))
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
        Ok((outcome.report, sidecar))
    })();

    match result {
        Ok((report, sidecar)) => BatchItem {
            source_name,
            result: Ok(report),
            sidecar,
        },
        Err(err) => BatchItem {
            source_name,
            result: Err(err),
            sidecar: None,
        },
    }
}

async fn run_preview(
    input: &Path,
    save: Option<PathBuf>,
    export: Option<PathBuf>,
    edit: &EditArgs,
    config: &EditorConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let filters = edit.parse_filters()?;
    let turns = edit.quarter_turns()?;
    let tags = metadata::read_exif_tags(input)
        .inspect_err(|e| warn!(error = %e, "Could not read EXIF"))
        .ok();

    let session = Session::new(
        RustBackend::new(),
        SessionConfig::from_editor_config(config),
        tokio::runtime::Handle::current(),
    );
    if filters.is_empty() {
        session.load_bytes(&std::fs::read(input)?, tags).await?;
    } else {
        let image = imaging::load_image(input)?;
        session.load_image(imaging::apply_filters(&image, &filters), tags);
    }

    for _ in 0..turns.unsigned_abs() {
        if turns > 0 {
            session.rotate_right();
        } else {
            session.rotate_left();
        }
    }
    session.set_flipped(edit.flip);
    if let Some(preset) = edit.preset() {
        session.apply_preset(preset);
    }
    if let Some(width) = &edit.width {
        session.set_target_width(width);
    }
    if let Some(height) = &edit.height {
        session.set_target_height(height);
    }
    if let Some(format) = edit.format {
        session.set_format(format);
    }
    if let Some(strategy) = edit.strategy {
        session.set_resize_strategy(strategy);
    }
    if let Some(quality) = edit.quality {
        session.set_quality(quality);
    }
    session.settle().await;

    let snapshot = session.snapshot();
    output::print_preview(&snapshot);

    if let (Some(path), Some(preview)) = (save, &snapshot.preview) {
        preview.save_with_format(&path, image::ImageFormat::Png)?;
        println!("Saved preview → {}", path.display());
    }

    if let Some(dir) = export {
        let report = session.export(DirectorySink::new(dir)).await?;
        println!("Exported {}", report.file_name);
        for line in output::format_export_report(&report) {
            println!("    {}", line);
        }
    }
    Ok(())
}
