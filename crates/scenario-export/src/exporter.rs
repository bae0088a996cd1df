//! Whole-scenario conversion.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use scenario_proto as pb;
use scenario_proto::required_prediction::DifficultyLevel;

use crate::canonical::{self, CanonicalScenario, ExportError, RawScenario};
use crate::diagnostics::{Diagnostic, DiagnosticSink, IdKind, Reporter};
use crate::features::encode_feature;
use crate::ids;
use crate::taxonomy;
use crate::tracks::encode_track;
use crate::writer::RecordFileWriter;

/// Convert a validated scenario into one target message.
///
/// Track order, and therefore every index stored in the message, follows the
/// iteration order of `scenario.tracks`.
pub fn export_scenario(scenario: &CanonicalScenario, sink: &dyn DiagnosticSink) -> pb::Scenario {
    let reporter = Reporter::new(&scenario.id, sink);
    let track_index = ids::build_index(scenario.tracks.keys().map(String::as_str));

    let tracks = scenario
        .tracks
        .values()
        .map(|track| encode_track(track, &reporter))
        .collect();

    let sdc_track_index = match track_index.get(scenario.sdc_id.as_str()) {
        Some(&idx) => Some(idx as i32),
        None => {
            reporter.report(Diagnostic::MissingSdcTrack {
                sdc_id: scenario.sdc_id.clone(),
            });
            None
        }
    };

    let dynamic_map_states = match &scenario.traffic_lights {
        Some(lights) => {
            // Resolve each lane once rather than once per timestep.
            let lanes: Vec<(i64, &[String])> = lights
                .iter()
                .map(|(lane, history)| {
                    let id = ids::resolve_reported(IdKind::Lane, lane, &reporter);
                    (i64::from(id), history.as_slice())
                })
                .collect();
            (0..scenario.timesteps.len())
                .map(|t| pb::DynamicMapState {
                    lane_states: lanes
                        .iter()
                        .filter_map(|(lane, history)| {
                            history.get(t).map(|token| pb::TrafficSignalLaneState {
                                lane: Some(*lane),
                                state: Some(taxonomy::light_state(token) as i32),
                            })
                        })
                        .collect(),
                })
                .collect()
        }
        None => Vec::new(),
    };

    let map_features = scenario
        .map_features
        .values()
        .filter_map(|feature| encode_feature(feature, &reporter))
        .collect();

    let objects_of_interest = scenario
        .objects_of_interest
        .iter()
        .filter_map(|id| lookup(&track_index, "objects_of_interest", id, &reporter))
        .map(|idx| idx as i32)
        .collect();

    let tracks_to_predict = scenario
        .tracks_to_predict
        .iter()
        .filter_map(|(id, difficulty)| {
            let idx = lookup(&track_index, "tracks_to_predict", id, &reporter)?;
            Some(pb::RequiredPrediction {
                track_index: Some(idx as i32),
                difficulty: Some(difficulty_level(*difficulty) as i32),
            })
        })
        .collect();

    pb::Scenario {
        scenario_id: Some(scenario.id.clone()),
        timestamps_seconds: scenario.timesteps.clone(),
        current_time_index: Some(scenario.effective_current_time_index()),
        tracks,
        sdc_track_index,
        dynamic_map_states,
        map_features,
        objects_of_interest,
        tracks_to_predict,
    }
}

/// Validate then export; nothing is encoded if validation fails.
pub fn export_raw(
    raw: RawScenario,
    sink: &dyn DiagnosticSink,
) -> Result<pb::Scenario, ExportError> {
    let scenario = CanonicalScenario::from_raw(raw)?;
    Ok(export_scenario(&scenario, sink))
}

/// Write one scenario as a single-record TFRecord file.
pub fn write_scenario(path: &Path, scenario: &pb::Scenario, overwrite: bool) -> Result<()> {
    let mut writer = RecordFileWriter::create(path, overwrite)?;
    writer.write_message(scenario)?;
    writer.finish()?;
    Ok(())
}

/// Read, export, and write a single canonical file.
pub fn export_file(
    input: &Path,
    output: &Path,
    overwrite: bool,
    sink: &dyn DiagnosticSink,
) -> Result<pb::Scenario> {
    let scenario = canonical::load_scenario(input)?;
    let message = export_scenario(&scenario, sink);
    write_scenario(output, &message, overwrite)
        .with_context(|| format!("failed to export {}", input.display()))?;
    Ok(message)
}

fn lookup(
    index: &HashMap<&str, usize>,
    list: &'static str,
    id: &str,
    reporter: &Reporter<'_>,
) -> Option<usize> {
    let found = index.get(id).copied();
    if found.is_none() {
        reporter.report(Diagnostic::UnknownTrackReference {
            list,
            track_id: id.to_string(),
        });
    }
    found
}

fn difficulty_level(raw: Option<f64>) -> DifficultyLevel {
    match raw {
        Some(d) if d == 1.0 => DifficultyLevel::Level1,
        Some(d) if d == 2.0 => DifficultyLevel::Level2,
        _ => DifficultyLevel::None,
    }
}
