use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};

/// Source dataset a directory of canonical scenarios was ingested from.
/// Only used to pick the input sub-directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Waymo,
    Nuplan,
    Nuscenes,
    Argoverse2,
}

impl Dataset {
    pub fn dir_name(self) -> &'static str {
        match self {
            Dataset::Waymo => "waymo",
            Dataset::Nuplan => "nuplan",
            Dataset::Nuscenes => "nuscenes",
            Dataset::Argoverse2 => "argoverse2",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// How per-unit output files are named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputNaming {
    /// `<input stem>.tfrecord`, with `.json` / `.json.gz` stripped.
    #[default]
    InputStem,
    /// `<scenario id>.tfrecord`.
    ScenarioId,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub dataset: Option<Dataset>,
    #[serde(default = "defaults::num_workers")]
    pub num_workers: usize,
    #[serde(default = "defaults::file_pattern")]
    pub file_pattern: String,
    #[serde(default)]
    pub naming: OutputNaming,
    /// Name of the consolidated file under the output directory; no merge when unset.
    #[serde(default)]
    pub merged_filename: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub unit_timeout_secs: Option<f64>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            num_workers: defaults::num_workers(),
            file_pattern: defaults::file_pattern(),
            naming: OutputNaming::default(),
            merged_filename: None,
            overwrite: false,
            unit_timeout_secs: None,
        }
    }
}

impl ExportConfig {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }
}

mod defaults {
    pub fn num_workers() -> usize { 8 }
    pub fn file_pattern() -> String { "*.json*".to_string() }
}
