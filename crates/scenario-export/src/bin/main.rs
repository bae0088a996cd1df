use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use env_logger::{Env, Target};
use log::{error, info, warn};
use scenario_export::{
    CancelToken, Dataset, ExportConfig, ExportOptions, LogSink, OutputNaming, run_export,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Convert canonical scenario files to Waymo-format TFRecords"
)]
struct Cli {
    /// Dataset the scenarios were ingested from (selects <input-dir>/<dataset>)
    #[arg(short, long, value_enum)]
    dataset: Option<Dataset>,

    /// Directory containing canonical scenario files
    #[arg(long, value_name = "DIR")]
    input_dir: PathBuf,

    /// Directory to write TFRecord files to
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Number of worker threads (default 8)
    #[arg(long, value_name = "N")]
    num_workers: Option<usize>,

    /// Merge all per-scenario files into <output-dir>/<NAME>
    #[arg(long, value_name = "NAME")]
    merged_filename: Option<String>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Write log output to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// TOML file with export settings; flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Glob matched against input file names (default *.json*)
    #[arg(long, value_name = "GLOB")]
    pattern: Option<String>,

    /// How per-scenario output files are named
    #[arg(long, value_enum)]
    naming: Option<OutputNaming>,

    /// Overwrite existing outputs if present
    #[arg(long)]
    overwrite: bool,

    /// Fail a scenario that takes longer than this many seconds
    #[arg(long, value_name = "SECS")]
    unit_timeout_secs: Option<f64>,

    /// Exit non-zero if any scenario failed to convert
    #[arg(long)]
    fail_on_error: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_file.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => ExportConfig::from_toml(path)?,
        None => ExportConfig::default(),
    };
    config.dataset = cli.dataset.or(config.dataset);
    config.num_workers = cli.num_workers.unwrap_or(config.num_workers);
    config.merged_filename = cli.merged_filename.or(config.merged_filename);
    config.file_pattern = cli.pattern.unwrap_or(config.file_pattern);
    config.naming = cli.naming.unwrap_or(config.naming);
    config.overwrite |= cli.overwrite;
    config.unit_timeout_secs = cli.unit_timeout_secs.or(config.unit_timeout_secs);

    let Some(dataset) = config.dataset else {
        bail!("--dataset is required (or set `dataset` in the config file)");
    };
    let unit_timeout = config
        .unit_timeout_secs
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid unit timeout")?;

    info!("Converting {dataset} scenario files to Waymo format");
    info!("Input directory: {}", cli.input_dir.display());
    info!("Output directory: {}", cli.output_dir.display());

    let Some(input_dir) = resolve_input_dir(&cli.input_dir, dataset) else {
        return Ok(());
    };

    let options = ExportOptions {
        input_dir,
        output_dir: cli.output_dir,
        num_workers: config.num_workers,
        file_pattern: config.file_pattern,
        naming: config.naming,
        overwrite: config.overwrite,
        unit_timeout,
        show_progress: true,
    };
    let summary = run_export(
        &options,
        config.merged_filename.as_deref(),
        &LogSink,
        &CancelToken::new(),
    )?;

    if let Some(merge) = &summary.merge {
        info!(
            "Merged {} records from {} files ({} skipped)",
            merge.records,
            merge.files,
            merge.skipped.len()
        );
    }
    if cli.fail_on_error && summary.export.failed > 0 {
        bail!(
            "{} of {} scenario files failed to convert",
            summary.export.failed,
            summary.export.total()
        );
    }
    info!("Conversion complete!");
    Ok(())
}

fn init_logging(level: LogLevel, log_file: Option<&Path>) -> Result<()> {
    let env = Env::default().default_filter_or(level.as_filter());
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(path) = log_file {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// `<input_dir>/<dataset>` if present, else `input_dir` itself. `None` (after
/// logging) when neither exists.
fn resolve_input_dir(input_dir: &Path, dataset: Dataset) -> Option<PathBuf> {
    let nested = input_dir.join(dataset.dir_name());
    if nested.is_dir() {
        return Some(nested);
    }
    warn!(
        "Dataset directory {} does not exist, trying direct input path",
        nested.display()
    );
    if input_dir.is_dir() {
        Some(input_dir.to_path_buf())
    } else {
        error!("Input directory {} does not exist", input_dir.display());
        None
    }
}
