use scenario_proto as pb;

use crate::canonical::{Track, TrackState};
use crate::diagnostics::{IdKind, Reporter};
use crate::ids;
use crate::taxonomy;

/// Encode one agent. Every timestep yields a state so gaps stay explicit;
/// invalid steps carry nothing but `valid = false`.
pub fn encode_track(track: &Track, reporter: &Reporter<'_>) -> pb::Track {
    pb::Track {
        id: Some(ids::resolve_reported(IdKind::Track, &track.id, reporter)),
        object_type: Some(taxonomy::object_type(&track.kind) as i32),
        states: track.states.iter().map(encode_state).collect(),
    }
}

pub fn encode_state(state: &TrackState) -> pb::ObjectState {
    if !state.valid {
        return pb::ObjectState {
            valid: Some(false),
            ..Default::default()
        };
    }
    let [x, y, z] = state.position;
    let [vx, vy] = state.velocity;
    pb::ObjectState {
        center_x: Some(x),
        center_y: Some(y),
        center_z: Some(z),
        length: Some(state.length as f32),
        width: Some(state.width as f32),
        height: Some(state.height as f32),
        heading: Some(state.heading as f32),
        velocity_x: Some(vx as f32),
        velocity_y: Some(vy as f32),
        valid: Some(true),
    }
}
