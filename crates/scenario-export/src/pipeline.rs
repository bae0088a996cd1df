//! Directory-level export: one unit of work per canonical scenario file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;

use crate::canonical;
use crate::config::OutputNaming;
use crate::diagnostics::DiagnosticSink;
use crate::exporter::export_scenario;
use crate::merge::{MergeOptions, MergeSummary, merge_records};
use crate::writer::RecordFileWriter;

/// Sub-directory of the output directory that holds per-unit files when
/// [`run_export`] is used.
pub const TEMP_DIR: &str = "temp";
pub const RECORD_EXTENSION: &str = "tfrecord";

/// Configuration for exporting a directory of canonical scenarios.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Directory scanned (non-recursively) for input files.
    pub input_dir: PathBuf,
    /// Directory receiving one `.tfrecord` per successful unit.
    pub output_dir: PathBuf,
    /// Worker threads; must be > 0.
    pub num_workers: usize,
    /// Glob matched against file names, e.g. `*.json*`.
    pub file_pattern: String,
    pub naming: OutputNaming,
    /// Replace existing per-unit outputs instead of failing the unit.
    pub overwrite: bool,
    /// Per-unit time budget, checked between the read, export and write stages.
    pub unit_timeout: Option<Duration>,
    pub show_progress: bool,
}

impl ExportOptions {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            num_workers: 8,
            file_pattern: "*.json*".to_string(),
            naming: OutputNaming::InputStem,
            overwrite: false,
            unit_timeout: None,
            show_progress: true,
        }
    }
}

/// Shared stop flag. Units that have not started when it is set report
/// [`UnitStatus::Cancelled`]; running units finish normally.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
#[error("unit exceeded its {limit:?} budget after the {stage} stage")]
pub struct DeadlineExceeded {
    pub stage: &'static str,
    pub limit: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    Succeeded(PathBuf),
    /// The unit's error chain, already logged.
    Failed(String),
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitOutcome {
    pub input: PathBuf,
    pub status: UnitStatus,
}

#[derive(Clone, Debug, Default)]
pub struct ExportSummary {
    /// Output paths of successful units, sorted.
    pub succeeded: Vec<PathBuf>,
    pub failed: usize,
    pub cancelled: usize,
    /// One entry per discovered input, in input order.
    pub outcomes: Vec<UnitOutcome>,
}

impl ExportSummary {
    fn from_outcomes(outcomes: Vec<UnitOutcome>) -> Self {
        let mut summary = ExportSummary::default();
        for outcome in &outcomes {
            match &outcome.status {
                UnitStatus::Succeeded(path) => summary.succeeded.push(path.clone()),
                UnitStatus::Failed(_) => summary.failed += 1,
                UnitStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary.succeeded.sort();
        summary.outcomes = outcomes;
        summary
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub export: ExportSummary,
    pub merge: Option<MergeSummary>,
}

/// Files directly inside `dir` whose names match `pattern`, sorted by path.
pub fn discover_inputs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher =
        glob::Pattern::new(pattern).with_context(|| format!("invalid file pattern '{pattern}'"))?;
    let mut inputs = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if matcher.matches(name) {
            inputs.push(entry.into_path());
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Export every matching file in `opts.input_dir` into `opts.output_dir`.
///
/// A failing unit is logged and recorded; it never stops its siblings.
/// Only precondition failures (bad options, unreadable input directory)
/// return `Err`.
pub fn export_directory(
    opts: &ExportOptions,
    sink: &dyn DiagnosticSink,
    cancel: &CancelToken,
) -> Result<ExportSummary> {
    if opts.num_workers == 0 {
        bail!("num_workers must be > 0");
    }
    if !opts.input_dir.is_dir() {
        bail!(
            "input directory '{}' does not exist",
            opts.input_dir.display()
        );
    }
    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("failed to create output dir {}", opts.output_dir.display()))?;

    let inputs = discover_inputs(&opts.input_dir, &opts.file_pattern)?;
    info!(
        "Found {} scenario files in {}",
        inputs.len(),
        opts.input_dir.display()
    );

    let pb = progress_bar(inputs.len() as u64, opts.show_progress);
    let claimed = Mutex::new(HashSet::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.num_workers)
        .build()
        .context("failed to build rayon thread pool")?;
    let outcomes: Vec<UnitOutcome> = pool.install(|| {
        inputs
            .into_par_iter()
            .map(|input| {
                let status = if cancel.is_cancelled() {
                    UnitStatus::Cancelled
                } else {
                    match export_unit(&input, opts, sink, &claimed) {
                        Ok(output) => UnitStatus::Succeeded(output),
                        Err(err) => {
                            error!("Error processing {}: {err:#}", input.display());
                            UnitStatus::Failed(format!("{err:#}"))
                        }
                    }
                };
                pb.inc(1);
                UnitOutcome { input, status }
            })
            .collect()
    });
    pb.finish_with_message("scenarios exported");

    let summary = ExportSummary::from_outcomes(outcomes);
    if summary.cancelled > 0 {
        warn!("{} units cancelled before starting", summary.cancelled);
    }
    Ok(summary)
}

/// Export into `<output_dir>/temp/` and, when `merged_filename` is given,
/// consolidate the per-unit files into `<output_dir>/<merged_filename>`.
pub fn run_export(
    opts: &ExportOptions,
    merged_filename: Option<&str>,
    sink: &dyn DiagnosticSink,
    cancel: &CancelToken,
) -> Result<RunSummary> {
    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("failed to create output dir {}", opts.output_dir.display()))?;
    let temp_dir = opts.output_dir.join(TEMP_DIR);
    let unit_opts = ExportOptions {
        output_dir: temp_dir.clone(),
        ..opts.clone()
    };

    let export = export_directory(&unit_opts, sink, cancel)?;
    info!(
        "Converted {} of {} scenario files ({} failed)",
        export.succeeded.len(),
        export.total(),
        export.failed
    );

    let merge = match merged_filename {
        Some(_) if cancel.is_cancelled() => {
            warn!("Export was cancelled; skipping merge");
            None
        }
        Some(name) => {
            let merged = merge_records(&MergeOptions {
                input_dir: temp_dir,
                output_file: opts.output_dir.join(name),
                overwrite: opts.overwrite,
                show_progress: opts.show_progress,
            })?;
            Some(merged)
        }
        None => None,
    };

    info!(
        "Conversion complete. Output files are in {}",
        opts.output_dir.display()
    );
    Ok(RunSummary { export, merge })
}

fn export_unit(
    input: &Path,
    opts: &ExportOptions,
    sink: &dyn DiagnosticSink,
    claimed: &Mutex<HashSet<PathBuf>>,
) -> Result<PathBuf> {
    let deadline = Deadline::start(opts.unit_timeout);

    let scenario = canonical::load_scenario(input)?;
    deadline.check("read")?;

    let message = export_scenario(&scenario, sink);
    deadline.check("export")?;

    let stem = match opts.naming {
        OutputNaming::InputStem => output_stem(input)
            .with_context(|| format!("cannot derive an output name from {}", input.display()))?,
        OutputNaming::ScenarioId => {
            if !is_safe_file_stem(&scenario.id) {
                bail!("scenario id '{}' is not usable as a file name", scenario.id);
            }
            scenario.id.clone()
        }
    };
    let output = opts.output_dir.join(format!("{stem}.{RECORD_EXTENSION}"));
    if !claimed.lock().insert(output.clone()) {
        bail!(
            "{} is already produced by another input in this run",
            output.display()
        );
    }

    let mut writer = RecordFileWriter::create(&output, opts.overwrite)?;
    writer.write_message(&message)?;
    // An overrun here drops the writer, which discards the temp file.
    deadline.check("write")?;
    writer.finish()?;
    Ok(output)
}

/// `scene.json.gz` → `scene`, `scene.json` → `scene`, otherwise the plain stem.
pub fn output_stem(input: &Path) -> Option<String> {
    let name = input.file_name()?.to_str()?;
    let base = name.strip_suffix(".gz").unwrap_or(name);
    let stem = match base.strip_suffix(".json") {
        Some(stem) => stem,
        None => Path::new(base).file_stem()?.to_str()?,
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    fn start(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    fn check(&self, stage: &'static str) -> Result<(), DeadlineExceeded> {
        match self.limit {
            Some(limit) if self.start.elapsed() >= limit => Err(DeadlineExceeded { stage, limit }),
            _ => Ok(()),
        }
    }
}

pub(crate) fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len}")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stems_strip_json_and_gz() {
        assert_eq!(output_stem(Path::new("/d/a.json")).as_deref(), Some("a"));
        assert_eq!(output_stem(Path::new("/d/a.b.json.gz")).as_deref(), Some("a.b"));
        assert_eq!(output_stem(Path::new("/d/a.pkl")).as_deref(), Some("a"));
        assert_eq!(output_stem(Path::new("/d/.json")), None);
    }

    #[test]
    fn unsafe_scenario_ids_are_refused() {
        assert!(is_safe_file_stem("scn-001"));
        assert!(!is_safe_file_stem(""));
        assert!(!is_safe_file_stem(".."));
        assert!(!is_safe_file_stem("a/b"));
    }

    #[test]
    fn discovery_is_flat_filtered_and_sorted() {
        let dir = tempdir().unwrap();
        for name in ["b.json", "a.json.gz", "notes.txt", "c.json.tmp"] {
            fs::write(dir.path().join(name), b"{}").unwrap();
        }
        fs::create_dir(dir.path().join("nested.json")).unwrap();
        fs::write(dir.path().join("nested.json/d.json"), b"{}").unwrap();

        let found = discover_inputs(dir.path(), "*.json*").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.json.gz", "b.json", "c.json.tmp"]);

        let found = discover_inputs(dir.path(), "*.json").unwrap();
        assert_eq!(found, vec![dir.path().join("b.json")]);
    }

    #[test]
    fn zero_timeout_always_trips() {
        let deadline = Deadline::start(Some(Duration::ZERO));
        let err = deadline.check("read").unwrap_err();
        assert_eq!(err.stage, "read");
        assert!(Deadline::start(None).check("read").is_ok());
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let dir = tempdir().unwrap();
        let mut opts = ExportOptions::new(dir.path(), dir.path().join("out"));
        opts.num_workers = 0;
        let err = export_directory(&opts, &crate::LogSink, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("num_workers"));
    }
}
