//! Map feature classification and encoding.
//!
//! Each descriptor becomes exactly one of the five feature variants, picked in
//! a fixed order: a speed limit marks a lane, then road-line tokens, road-edge
//! tokens, and finally the stop-sign and crosswalk markers. Anything else is
//! dropped with a debug diagnostic.

use scenario_proto as pb;
use scenario_proto::map_feature::FeatureData;
use scenario_proto::road_edge::RoadEdgeType;
use scenario_proto::road_line::RoadLineType;

use crate::canonical::{Boundary, MapFeature, Neighbor, Point};
use crate::diagnostics::{Diagnostic, IdKind, Reporter};
use crate::ids;
use crate::taxonomy::{self, CROSSWALK, STOP_SIGN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Lane,
    RoadLine(RoadLineType),
    RoadEdge(RoadEdgeType),
    StopSign,
    Crosswalk,
}

pub fn classify(feature: &MapFeature) -> Option<FeatureKind> {
    classify_descriptor(feature.speed_limit_mph, feature.type_token.as_deref())
}

/// Classification from the two fields that decide it, usable before the rest
/// of a descriptor has been validated.
pub fn classify_descriptor(
    speed_limit_mph: Option<f64>,
    token: Option<&str>,
) -> Option<FeatureKind> {
    if speed_limit_mph.is_some() {
        return Some(FeatureKind::Lane);
    }
    let token = token?;
    if let Some(line) = taxonomy::lookup_road_line(token) {
        return Some(FeatureKind::RoadLine(line));
    }
    if let Some(edge) = taxonomy::lookup_road_edge(token) {
        return Some(FeatureKind::RoadEdge(edge));
    }
    match token {
        STOP_SIGN => Some(FeatureKind::StopSign),
        CROSSWALK => Some(FeatureKind::Crosswalk),
        _ => None,
    }
}

/// Encode one descriptor, or `None` (with a diagnostic) when it fits no variant.
pub fn encode_feature(feature: &MapFeature, reporter: &Reporter<'_>) -> Option<pb::MapFeature> {
    let Some(kind) = classify(feature) else {
        reporter.report(Diagnostic::DroppedFeature {
            feature_id: feature.id.clone(),
            type_token: feature.type_token.clone(),
        });
        return None;
    };

    let data = match kind {
        FeatureKind::Lane => FeatureData::Lane(encode_lane(feature)),
        FeatureKind::RoadLine(line) => FeatureData::RoadLine(pb::RoadLine {
            r#type: Some(line as i32),
            polyline: map_points(&feature.polyline),
        }),
        FeatureKind::RoadEdge(edge) => FeatureData::RoadEdge(pb::RoadEdge {
            r#type: Some(edge as i32),
            polyline: map_points(&feature.polyline),
        }),
        FeatureKind::StopSign => FeatureData::StopSign(pb::StopSign {
            lane: feature.stop_lanes.clone(),
            position: feature.position.map(map_point),
        }),
        FeatureKind::Crosswalk => FeatureData::Crosswalk(pb::Crosswalk {
            polygon: map_points(&feature.polygon),
        }),
    };

    let id = ids::resolve_reported(IdKind::MapFeature, &feature.id, reporter);
    Some(pb::MapFeature {
        id: Some(i64::from(id)),
        feature_data: Some(data),
    })
}

fn encode_lane(feature: &MapFeature) -> pb::Lane {
    let lane_type = taxonomy::lane_type(feature.type_token.as_deref().unwrap_or(""));
    pb::Lane {
        speed_limit_mph: feature.speed_limit_mph,
        r#type: Some(lane_type as i32),
        interpolating: Some(feature.interpolating),
        polyline: map_points(&feature.polyline),
        entry_lanes: feature.entry_lanes.clone(),
        exit_lanes: feature.exit_lanes.clone(),
        left_neighbors: feature.left_neighbors.iter().map(lane_neighbor).collect(),
        right_neighbors: feature.right_neighbors.iter().map(lane_neighbor).collect(),
        left_boundaries: feature.left_boundaries.iter().map(lane_boundary).collect(),
        right_boundaries: feature.right_boundaries.iter().map(lane_boundary).collect(),
    }
}

fn lane_boundary(boundary: &Boundary) -> pb::LaneBoundary {
    pb::LaneBoundary {
        boundary_feature_id: boundary.feature_id.clone(),
        boundary_type: boundary
            .boundary_type
            .as_deref()
            .map(|t| taxonomy::road_line_type(t) as i32),
    }
}

fn lane_neighbor(neighbor: &Neighbor) -> pb::LaneNeighbor {
    let (self_start_index, self_end_index) = split(neighbor.self_range);
    let (neighbor_start_index, neighbor_end_index) = split(neighbor.neighbor_range);
    pb::LaneNeighbor {
        feature_id: neighbor.feature_id.clone(),
        self_start_index,
        self_end_index,
        neighbor_start_index,
        neighbor_end_index,
    }
}

fn split(range: Option<(i32, i32)>) -> (Option<i32>, Option<i32>) {
    match range {
        Some((start, end)) => (Some(start), Some(end)),
        None => (None, None),
    }
}

pub fn map_point(point: Point) -> pb::MapPoint {
    pb::MapPoint {
        x: Some(point.x),
        y: Some(point.y),
        z: point.z,
    }
}

fn map_points(points: &[Point]) -> Vec<pb::MapPoint> {
    points.iter().copied().map(map_point).collect()
}
