//! Non-fatal findings raised while encoding a scenario.
//!
//! The codec reports through a [`DiagnosticSink`] handed in by the caller and
//! never touches logger configuration itself. [`LogSink`] forwards to the `log`
//! facade; [`CollectingSink`] keeps everything in memory for inspection.

use std::fmt;

use log::{debug, warn};
use parking_lot::Mutex;

/// Which identifier space a raw id was being resolved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Track,
    Lane,
    MapFeature,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdKind::Track => "track",
            IdKind::Lane => "lane",
            IdKind::MapFeature => "map feature",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A non-numeric (or out of range) id was hashed into the int32 space.
    HashedId {
        kind: IdKind,
        raw: String,
        resolved: i32,
    },
    /// `sdc_id` names no track; the ego index keeps its default.
    MissingSdcTrack { sdc_id: String },
    /// No feature variant matched the descriptor.
    DroppedFeature {
        feature_id: String,
        type_token: Option<String>,
    },
    /// An objects-of-interest or tracks-to-predict id names no track.
    UnknownTrackReference { list: &'static str, track_id: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::HashedId { .. } | Diagnostic::MissingSdcTrack { .. } => Severity::Warning,
            Diagnostic::DroppedFeature { .. } | Diagnostic::UnknownTrackReference { .. } => {
                Severity::Debug
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::HashedId {
                kind,
                raw,
                resolved,
            } => write!(
                f,
                "could not convert {kind} id '{raw}' to an integer, hashed to {resolved}"
            ),
            Diagnostic::MissingSdcTrack { sdc_id } => {
                write!(f, "sdc id '{sdc_id}' matches no track; sdc_track_index left unset")
            }
            Diagnostic::DroppedFeature {
                feature_id,
                type_token,
            } => write!(
                f,
                "skipping unsupported map feature {feature_id} (type {:?})",
                type_token.as_deref().unwrap_or("")
            ),
            Diagnostic::UnknownTrackReference { list, track_id } => {
                write!(f, "{list} references unknown track '{track_id}', skipped")
            }
        }
    }
}

/// Destination for diagnostics. Implementations must tolerate concurrent
/// calls from pipeline workers.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, scenario_id: &str, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade at their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, scenario_id: &str, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Warning => warn!("scenario {scenario_id}: {diagnostic}"),
            Severity::Debug => debug!("scenario {scenario_id}: {diagnostic}"),
        }
    }
}

/// Records every diagnostic along with the scenario it came from.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<(String, Diagnostic)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, Diagnostic)> {
        self.entries.lock().clone()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries.lock().iter().map(|(_, d)| d.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, scenario_id: &str, diagnostic: Diagnostic) {
        self.entries
            .lock()
            .push((scenario_id.to_string(), diagnostic));
    }
}

/// A sink bound to one scenario, threaded through the encoders.
#[derive(Clone, Copy)]
pub struct Reporter<'a> {
    scenario_id: &'a str,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> Reporter<'a> {
    pub fn new(scenario_id: &'a str, sink: &'a dyn DiagnosticSink) -> Self {
        Self { scenario_id, sink }
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        self.sink.emit(self.scenario_id, diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_tags_scenario() {
        let sink = CollectingSink::new();
        let reporter = Reporter::new("scn-1", &sink);
        reporter.report(Diagnostic::MissingSdcTrack {
            sdc_id: "ego".into(),
        });
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "scn-1");
        assert_eq!(entries[0].1.severity(), Severity::Warning);
    }

    #[test]
    fn dropped_features_are_debug_level() {
        let d = Diagnostic::DroppedFeature {
            feature_id: "9".into(),
            type_token: Some("SPEED_BUMP".into()),
        };
        assert_eq!(d.severity(), Severity::Debug);
        assert!(d.to_string().contains("SPEED_BUMP"));
    }
}
