//! Canonical type tokens → target enum codes.
//!
//! Every table is total: tokens outside it resolve to that taxonomy's
//! fallback instead of failing.

use scenario_proto::lane::LaneType;
use scenario_proto::road_edge::RoadEdgeType;
use scenario_proto::road_line::RoadLineType;
use scenario_proto::track::ObjectType;
use scenario_proto::traffic_signal_lane_state::State as LightState;

pub const STOP_SIGN: &str = "STOP_SIGN";
pub const CROSSWALK: &str = "CROSSWALK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taxonomy {
    Agent,
    Lane,
    RoadLine,
    RoadEdge,
    TrafficLight,
}

impl Taxonomy {
    /// Raw enum code for `token`.
    pub fn map(self, token: &str) -> i32 {
        match self {
            Taxonomy::Agent => object_type(token) as i32,
            Taxonomy::Lane => lane_type(token) as i32,
            Taxonomy::RoadLine => road_line_type(token) as i32,
            Taxonomy::RoadEdge => road_edge_type(token) as i32,
            Taxonomy::TrafficLight => light_state(token) as i32,
        }
    }

    pub fn fallback(self) -> i32 {
        match self {
            Taxonomy::Agent => ObjectType::TypeOther as i32,
            Taxonomy::Lane => LaneType::Undefined as i32,
            Taxonomy::RoadLine => RoadLineType::Undefined as i32,
            Taxonomy::RoadEdge => RoadEdgeType::Undefined as i32,
            Taxonomy::TrafficLight => LightState::Unknown as i32,
        }
    }
}

pub fn object_type(token: &str) -> ObjectType {
    match token {
        "VEHICLE" => ObjectType::TypeVehicle,
        "PEDESTRIAN" => ObjectType::TypePedestrian,
        "CYCLIST" => ObjectType::TypeCyclist,
        _ => ObjectType::TypeOther,
    }
}

pub fn lane_type(token: &str) -> LaneType {
    // The ingestion stage spells lane types with a LANE_ prefix; accept both.
    match token.strip_prefix("LANE_").unwrap_or(token) {
        "FREEWAY" => LaneType::Freeway,
        "SURFACE_STREET" => LaneType::SurfaceStreet,
        "BIKE_LANE" => LaneType::BikeLane,
        _ => LaneType::Undefined,
    }
}

/// `Some` only for the eight recognized road-line tokens.
pub fn lookup_road_line(token: &str) -> Option<RoadLineType> {
    Some(match token {
        "BROKEN_SINGLE_WHITE" => RoadLineType::BrokenSingleWhite,
        "SOLID_SINGLE_WHITE" => RoadLineType::SolidSingleWhite,
        "SOLID_DOUBLE_WHITE" => RoadLineType::SolidDoubleWhite,
        "BROKEN_SINGLE_YELLOW" => RoadLineType::BrokenSingleYellow,
        "BROKEN_DOUBLE_YELLOW" => RoadLineType::BrokenDoubleYellow,
        "SOLID_SINGLE_YELLOW" => RoadLineType::SolidSingleYellow,
        "SOLID_DOUBLE_YELLOW" => RoadLineType::SolidDoubleYellow,
        "PASSING_DOUBLE_YELLOW" => RoadLineType::PassingDoubleYellow,
        _ => return None,
    })
}

pub fn road_line_type(token: &str) -> RoadLineType {
    lookup_road_line(token).unwrap_or(RoadLineType::Undefined)
}

/// `Some` only for the three recognized road-edge tokens.
pub fn lookup_road_edge(token: &str) -> Option<RoadEdgeType> {
    Some(match token {
        "BOUNDARY_UNKNOWN" => RoadEdgeType::BoundaryUnknown,
        "ROAD_EDGE_BOUNDARY" => RoadEdgeType::RoadEdgeBoundary,
        "ROAD_EDGE_MEDIAN" => RoadEdgeType::RoadEdgeMedian,
        _ => return None,
    })
}

pub fn road_edge_type(token: &str) -> RoadEdgeType {
    lookup_road_edge(token).unwrap_or(RoadEdgeType::Undefined)
}

pub fn light_state(token: &str) -> LightState {
    match token {
        "ARROW_STOP" => LightState::ArrowStop,
        "ARROW_CAUTION" => LightState::ArrowCaution,
        "ARROW_GO" => LightState::ArrowGo,
        "STOP" => LightState::Stop,
        "CAUTION" => LightState::Caution,
        "GO" => LightState::Go,
        "FLASHING_STOP" => LightState::FlashingStop,
        "FLASHING_CAUTION" => LightState::FlashingCaution,
        _ => LightState::Unknown,
    }
}
