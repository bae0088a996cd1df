//! Export canonical driving scenarios as Waymo Open Motion `Scenario`
//! records.
//!
//! The codec ([`taxonomy`], [`ids`], [`features`], [`tracks`], [`exporter`])
//! is pure and reports non-fatal findings through a [`DiagnosticSink`]. The
//! [`pipeline`] fans it out over a directory with a bounded rayon pool, and
//! [`merge`] consolidates per-file outputs into one TFRecord file.

pub mod canonical;
pub mod config;
pub mod diagnostics;
pub mod exporter;
pub mod features;
pub mod ids;
pub mod merge;
pub mod pipeline;
pub mod taxonomy;
pub mod tracks;
pub mod writer;

pub use canonical::{CanonicalScenario, ExportError, load_scenario};
pub use config::{Dataset, ExportConfig, OutputNaming};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, LogSink};
pub use exporter::{export_file, export_raw, export_scenario};
pub use merge::{MergeOptions, MergeSummary, merge_records};
pub use pipeline::{
    CancelToken, ExportOptions, ExportSummary, RunSummary, UnitOutcome, UnitStatus,
    export_directory, run_export,
};
