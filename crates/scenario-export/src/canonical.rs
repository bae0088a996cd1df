//! Canonical scenario model.
//!
//! Files are parsed into the permissive `Raw*` layer first and then checked by
//! [`CanonicalScenario::from_raw`], so every structural problem surfaces as an
//! [`ExportError`] before any encoding starts.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::features::{self, FeatureKind};

/// Structural problems that make a scenario unexportable.
#[derive(Debug, Error, PartialEq)]
pub enum ExportError {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("timesteps must be strictly increasing (index {index})")]
    NonMonotonicTimesteps { index: usize },
    #[error("track {track}: `{field}` has {actual} entries, expected {expected}")]
    LengthMismatch {
        track: String,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("track {track}: `{field}` entry {index} has too few components")]
    MalformedState {
        track: String,
        field: &'static str,
        index: usize,
    },
    #[error("map feature {feature}: `{field}` point {index} needs at least two coordinates")]
    MalformedPoint {
        feature: String,
        field: &'static str,
        index: usize,
    },
    #[error("`{field}` value {value} does not fit in int32")]
    OutOfRange { field: String, value: i64 },
}

// ---------------------------------------------------------------------------
// Raw layer
// ---------------------------------------------------------------------------

/// Identifier as it appears on disk: a JSON string or integer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdToken {
    Int(i64),
    Text(String),
}

impl IdToken {
    pub fn into_string(self) -> String {
        match self {
            IdToken::Int(n) => n.to_string(),
            IdToken::Text(s) => s,
        }
    }
}

/// `valid` entries are booleans in some producers and 0/1 in others.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum ValidFlag {
    Bool(bool),
    Number(f64),
}

impl ValidFlag {
    pub fn is_valid(self) -> bool {
        match self {
            ValidFlag::Bool(b) => b,
            ValidFlag::Number(n) => n != 0.0,
        }
    }
}

/// Treat an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
pub struct RawScenario {
    pub metadata: Option<RawMetadata>,
    pub tracks: Option<IndexMap<String, RawTrack>>,
    #[serde(default, deserialize_with = "nullable")]
    pub map_features: IndexMap<String, RawMapFeature>,
    pub dynamic_map_states: Option<RawDynamicMapStates>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawMetadata {
    pub id: Option<IdToken>,
    pub ts: Option<Vec<f64>>,
    pub sdc_id: Option<IdToken>,
    pub current_time_index: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub objects_of_interest: Vec<IdToken>,
    #[serde(default, deserialize_with = "nullable")]
    pub tracks_to_predict: IndexMap<String, RawPrediction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPrediction {
    pub difficulty: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTrack {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub state: Option<RawTrackState>,
    pub metadata: Option<RawTrackMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTrackMetadata {
    pub track_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawTrackState {
    pub position: Vec<Vec<f64>>,
    pub length: Vec<f64>,
    pub width: Vec<f64>,
    pub height: Vec<f64>,
    pub heading: Vec<f64>,
    pub velocity: Vec<Vec<f64>>,
    pub valid: Vec<ValidFlag>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawMapFeature {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub speed_limit_mph: Option<f64>,
    pub polyline: Option<Vec<Vec<f64>>>,
    pub polygon: Option<Vec<Vec<f64>>>,
    pub position: Option<Vec<f64>>,
    pub interpolating: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub entry_lanes: Vec<IdToken>,
    #[serde(default, deserialize_with = "nullable")]
    pub exit_lanes: Vec<IdToken>,
    #[serde(default, deserialize_with = "nullable")]
    pub left_boundaries: Vec<RawBoundary>,
    #[serde(default, deserialize_with = "nullable")]
    pub right_boundaries: Vec<RawBoundary>,
    #[serde(default, deserialize_with = "nullable")]
    pub left_neighbor: Vec<RawNeighbor>,
    #[serde(default, deserialize_with = "nullable")]
    pub right_neighbor: Vec<RawNeighbor>,
    #[serde(default, deserialize_with = "nullable")]
    pub lane: Vec<IdToken>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawBoundary {
    pub boundary_feature_id: Option<IdToken>,
    pub boundary_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawNeighbor {
    pub feature_id: Option<IdToken>,
    pub self_start_index: Option<i64>,
    pub self_end_index: Option<i64>,
    pub neighbor_start_index: Option<i64>,
    pub neighbor_end_index: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawDynamicMapStates {
    #[serde(default, deserialize_with = "nullable")]
    pub traffic_light_states: IndexMap<String, RawLightHistory>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawLightHistory {
    #[serde(default, deserialize_with = "nullable")]
    pub state: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalScenario {
    pub id: String,
    pub timesteps: Vec<f64>,
    pub current_time_index: Option<i32>,
    pub sdc_id: String,
    /// Iteration order defines the track index space.
    pub tracks: IndexMap<String, Track>,
    pub map_features: IndexMap<String, MapFeature>,
    /// Lane id → per-timestep light tokens. `None` when the file carries no
    /// dynamic map states at all.
    pub traffic_lights: Option<IndexMap<String, Vec<String>>>,
    pub objects_of_interest: Vec<String>,
    /// Track id → raw difficulty value.
    pub tracks_to_predict: IndexMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub kind: String,
    pub states: Vec<TrackState>,
}

/// One timestep of a track. Kinematic fields are zero when `valid` is false.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackState {
    pub valid: bool,
    pub position: [f64; 3],
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub heading: f64,
    pub velocity: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapFeature {
    pub id: String,
    pub type_token: Option<String>,
    pub speed_limit_mph: Option<f64>,
    pub polyline: Vec<Point>,
    pub polygon: Vec<Point>,
    pub position: Option<Point>,
    pub interpolating: bool,
    pub entry_lanes: Vec<String>,
    pub exit_lanes: Vec<String>,
    pub left_boundaries: Vec<Boundary>,
    pub right_boundaries: Vec<Boundary>,
    pub left_neighbors: Vec<Neighbor>,
    pub right_neighbors: Vec<Neighbor>,
    /// Lanes controlled by a stop sign.
    pub stop_lanes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Boundary {
    pub feature_id: Option<String>,
    pub boundary_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbor {
    pub feature_id: Option<String>,
    pub self_range: Option<(i32, i32)>,
    pub neighbor_range: Option<(i32, i32)>,
}

impl CanonicalScenario {
    pub fn from_raw(raw: RawScenario) -> Result<Self, ExportError> {
        let metadata = raw.metadata.ok_or_else(|| missing("metadata"))?;
        let id = metadata
            .id
            .ok_or_else(|| missing("metadata.id"))?
            .into_string();
        let timesteps = metadata.ts.ok_or_else(|| missing("metadata.ts"))?;
        if let Some(index) = timesteps
            .windows(2)
            .position(|w| !(w[1] > w[0]))
            .map(|i| i + 1)
        {
            return Err(ExportError::NonMonotonicTimesteps { index });
        }
        let sdc_id = metadata
            .sdc_id
            .ok_or_else(|| missing("metadata.sdc_id"))?
            .into_string();
        let current_time_index = metadata
            .current_time_index
            .map(|v| to_i32("metadata.current_time_index", v))
            .transpose()?;

        let raw_tracks = raw.tracks.ok_or_else(|| missing("tracks"))?;
        let mut tracks = IndexMap::with_capacity(raw_tracks.len());
        for (track_id, raw_track) in raw_tracks {
            let track = Track::from_raw(&track_id, raw_track)?;
            tracks.insert(track_id, track);
        }

        let mut map_features = IndexMap::with_capacity(raw.map_features.len());
        for (feature_id, raw_feature) in raw.map_features {
            let feature = MapFeature::from_raw(&feature_id, raw_feature)?;
            map_features.insert(feature_id, feature);
        }

        let traffic_lights: Option<IndexMap<String, Vec<String>>> =
            raw.dynamic_map_states.map(|dms| {
                dms.traffic_light_states
                    .into_iter()
                    .map(|(lane, history)| {
                        let tokens: Vec<String> =
                            history.state.into_iter().map(light_token).collect();
                        (lane, tokens)
                    })
                    .collect()
            });

        Ok(CanonicalScenario {
            id,
            timesteps,
            current_time_index,
            sdc_id,
            tracks,
            map_features,
            traffic_lights,
            objects_of_interest: metadata
                .objects_of_interest
                .into_iter()
                .map(IdToken::into_string)
                .collect(),
            tracks_to_predict: metadata
                .tracks_to_predict
                .into_iter()
                .map(|(track, p)| (track, p.difficulty.as_ref().and_then(Value::as_f64)))
                .collect(),
        })
    }

    /// Explicit current index, else the middle timestep.
    pub fn effective_current_time_index(&self) -> i32 {
        self.current_time_index
            .unwrap_or((self.timesteps.len() / 2) as i32)
    }
}

impl Track {
    fn from_raw(track_id: &str, raw: RawTrack) -> Result<Self, ExportError> {
        let kind = raw
            .kind
            .ok_or_else(|| missing(format!("tracks.{track_id}.type")))?;
        let state = raw
            .state
            .ok_or_else(|| missing(format!("tracks.{track_id}.state")))?;
        let track_length = raw
            .metadata
            .and_then(|m| m.track_length)
            .unwrap_or(state.valid.len());

        let check = |field: &'static str, actual: usize| {
            if actual == track_length {
                Ok(())
            } else {
                Err(ExportError::LengthMismatch {
                    track: track_id.to_string(),
                    field,
                    expected: track_length,
                    actual,
                })
            }
        };
        check("valid", state.valid.len())?;
        check("position", state.position.len())?;
        check("length", state.length.len())?;
        check("width", state.width.len())?;
        check("height", state.height.len())?;
        check("heading", state.heading.len())?;
        check("velocity", state.velocity.len())?;

        let malformed = |field, index| ExportError::MalformedState {
            track: track_id.to_string(),
            field,
            index,
        };
        let mut states = Vec::with_capacity(track_length);
        for i in 0..track_length {
            if !state.valid[i].is_valid() {
                states.push(TrackState::default());
                continue;
            }
            let position = match state.position[i].as_slice() {
                [x, y, z, ..] => [*x, *y, *z],
                _ => return Err(malformed("position", i)),
            };
            let velocity = match state.velocity[i].as_slice() {
                [vx, vy, ..] => [*vx, *vy],
                _ => return Err(malformed("velocity", i)),
            };
            states.push(TrackState {
                valid: true,
                position,
                length: state.length[i],
                width: state.width[i],
                height: state.height[i],
                heading: state.heading[i],
                velocity,
            });
        }

        Ok(Track {
            id: track_id.to_string(),
            kind,
            states,
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl MapFeature {
    /// Only the fields the feature's variant encodes are validated. A
    /// descriptor that fits no variant keeps just its id and token.
    fn from_raw(feature_id: &str, raw: RawMapFeature) -> Result<Self, ExportError> {
        let kind = features::classify_descriptor(raw.speed_limit_mph, raw.kind.as_deref());
        let mut feature = MapFeature {
            id: feature_id.to_string(),
            type_token: raw.kind,
            speed_limit_mph: raw.speed_limit_mph,
            ..MapFeature::default()
        };
        let point = |field: &'static str, index: usize, coords: &[f64]| {
            Point::from_coords(coords).ok_or_else(|| ExportError::MalformedPoint {
                feature: feature_id.to_string(),
                field,
                index,
            })
        };
        let points = |field: &'static str, coords: Option<Vec<Vec<f64>>>| {
            coords
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(index, c)| point(field, index, c))
                .collect::<Result<Vec<_>, _>>()
        };
        let neighbors = |raw: Vec<RawNeighbor>| {
            raw.into_iter()
                .map(|n| Neighbor::from_raw(feature_id, n))
                .collect::<Result<Vec<_>, _>>()
        };

        match kind {
            Some(FeatureKind::Lane) => {
                feature.polyline = points("polyline", raw.polyline)?;
                feature.interpolating = raw.interpolating.unwrap_or(false);
                feature.entry_lanes = ids(raw.entry_lanes);
                feature.exit_lanes = ids(raw.exit_lanes);
                feature.left_boundaries =
                    raw.left_boundaries.into_iter().map(Boundary::from).collect();
                feature.right_boundaries =
                    raw.right_boundaries.into_iter().map(Boundary::from).collect();
                feature.left_neighbors = neighbors(raw.left_neighbor)?;
                feature.right_neighbors = neighbors(raw.right_neighbor)?;
            }
            Some(FeatureKind::RoadLine(_) | FeatureKind::RoadEdge(_)) => {
                feature.polyline = points("polyline", raw.polyline)?;
            }
            Some(FeatureKind::StopSign) => {
                feature.position = raw
                    .position
                    .map(|c| point("position", 0, &c))
                    .transpose()?;
                feature.stop_lanes = ids(raw.lane);
            }
            Some(FeatureKind::Crosswalk) => {
                feature.polygon = points("polygon", raw.polygon)?;
            }
            None => {}
        }
        Ok(feature)
    }
}

impl Point {
    /// Two or more coordinates; anything past the third is ignored.
    pub fn from_coords(coords: &[f64]) -> Option<Self> {
        match coords {
            [x, y] => Some(Point {
                x: *x,
                y: *y,
                z: None,
            }),
            [x, y, z, ..] => Some(Point {
                x: *x,
                y: *y,
                z: Some(*z),
            }),
            _ => None,
        }
    }
}

impl From<RawBoundary> for Boundary {
    fn from(raw: RawBoundary) -> Self {
        Boundary {
            feature_id: raw.boundary_feature_id.map(IdToken::into_string),
            boundary_type: raw.boundary_type,
        }
    }
}

impl Neighbor {
    fn from_raw(feature_id: &str, raw: RawNeighbor) -> Result<Self, ExportError> {
        Ok(Neighbor {
            feature_id: raw.feature_id.map(IdToken::into_string),
            self_range: index_range(
                feature_id,
                "self_index",
                raw.self_start_index,
                raw.self_end_index,
            )?,
            neighbor_range: index_range(
                feature_id,
                "neighbor_index",
                raw.neighbor_start_index,
                raw.neighbor_end_index,
            )?,
        })
    }
}

/// Both ends or nothing.
fn index_range(
    feature_id: &str,
    name: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<Option<(i32, i32)>, ExportError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(None);
    };
    let field = format!("map_features.{feature_id}.{name}");
    Ok(Some((to_i32(&field, start)?, to_i32(&field, end)?)))
}

fn missing(field: impl Into<String>) -> ExportError {
    ExportError::MissingField(field.into())
}

fn to_i32(field: &str, value: i64) -> Result<i32, ExportError> {
    i32::try_from(value).map_err(|_| ExportError::OutOfRange {
        field: field.to_string(),
        value,
    })
}

fn ids(tokens: Vec<IdToken>) -> Vec<String> {
    tokens.into_iter().map(IdToken::into_string).collect()
}

fn light_token(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read a canonical scenario file (`.json` or gzip-compressed `.json.gz`).
pub fn load_scenario(path: &Path) -> Result<CanonicalScenario> {
    let text = read_json_text(path)?;
    let raw: RawScenario = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    CanonicalScenario::from_raw(raw)
        .with_context(|| format!("invalid scenario in {}", path.display()))
}

fn read_json_text(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut buf = String::new();
    if path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
    {
        GzDecoder::new(file)
            .read_to_string(&mut buf)
            .with_context(|| format!("failed to decompress {}", path.display()))?;
    } else {
        BufReader::new(file)
            .read_to_string(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    Ok(buf)
}
