//! Map-level messages: points, lanes, lines, edges, signs, crosswalks and the
//! per-timestep traffic signal states that reference lanes.
//!
//! Field numbers follow `waymo_open_dataset/protos/map.proto`. Lane topology
//! ids (`entry_lanes`, boundary and neighbor feature ids, stop sign lanes) are
//! carried as strings, and `RoadEdgeType::BoundaryUnknown` is encoded as 3,
//! a value upstream's `RoadEdgeType` (0 to 2) does not define. These are the
//! two places this schema departs from upstream; a reader compiled from the
//! stock protos sees that edge type as an unrecognized enum value.

/// A single map vertex. `z` stays unset when the source point is planar.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct MapPoint {
    #[prost(double, optional, tag = "1")]
    pub x: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub y: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub z: Option<f64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MapFeature {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(oneof = "map_feature::FeatureData", tags = "3, 4, 5, 7, 8")]
    pub feature_data: Option<map_feature::FeatureData>,
}

pub mod map_feature {
    /// Exactly one geometry/semantic payload per feature.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum FeatureData {
        #[prost(message, tag = "3")]
        Lane(super::Lane),
        #[prost(message, tag = "4")]
        RoadLine(super::RoadLine),
        #[prost(message, tag = "5")]
        RoadEdge(super::RoadEdge),
        #[prost(message, tag = "7")]
        StopSign(super::StopSign),
        #[prost(message, tag = "8")]
        Crosswalk(super::Crosswalk),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Lane {
    #[prost(double, optional, tag = "1")]
    pub speed_limit_mph: Option<f64>,
    #[prost(enumeration = "lane::LaneType", optional, tag = "2")]
    pub r#type: Option<i32>,
    #[prost(bool, optional, tag = "3")]
    pub interpolating: Option<bool>,
    #[prost(message, repeated, tag = "8")]
    pub polyline: Vec<MapPoint>,
    #[prost(string, repeated, tag = "9")]
    pub entry_lanes: Vec<String>,
    #[prost(string, repeated, tag = "10")]
    pub exit_lanes: Vec<String>,
    #[prost(message, repeated, tag = "11")]
    pub left_neighbors: Vec<LaneNeighbor>,
    #[prost(message, repeated, tag = "12")]
    pub right_neighbors: Vec<LaneNeighbor>,
    #[prost(message, repeated, tag = "13")]
    pub left_boundaries: Vec<LaneBoundary>,
    #[prost(message, repeated, tag = "14")]
    pub right_boundaries: Vec<LaneBoundary>,
}

pub mod lane {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum LaneType {
        Undefined = 0,
        Freeway = 1,
        SurfaceStreet = 2,
        BikeLane = 3,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LaneBoundary {
    #[prost(string, optional, tag = "3")]
    pub boundary_feature_id: Option<String>,
    #[prost(enumeration = "road_line::RoadLineType", optional, tag = "4")]
    pub boundary_type: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LaneNeighbor {
    #[prost(string, optional, tag = "1")]
    pub feature_id: Option<String>,
    #[prost(int32, optional, tag = "2")]
    pub self_start_index: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub self_end_index: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub neighbor_start_index: Option<i32>,
    #[prost(int32, optional, tag = "5")]
    pub neighbor_end_index: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RoadLine {
    #[prost(enumeration = "road_line::RoadLineType", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(message, repeated, tag = "2")]
    pub polyline: Vec<MapPoint>,
}

pub mod road_line {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum RoadLineType {
        Undefined = 0,
        BrokenSingleWhite = 1,
        SolidSingleWhite = 2,
        SolidDoubleWhite = 3,
        BrokenSingleYellow = 4,
        BrokenDoubleYellow = 5,
        SolidSingleYellow = 6,
        SolidDoubleYellow = 7,
        PassingDoubleYellow = 8,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RoadEdge {
    #[prost(enumeration = "road_edge::RoadEdgeType", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(message, repeated, tag = "2")]
    pub polyline: Vec<MapPoint>,
}

pub mod road_edge {
    /// Values 1 and 2 match upstream. `BoundaryUnknown` is an explicit
    /// "edge of unknown kind", distinct from the unset default, and has no
    /// upstream counterpart.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum RoadEdgeType {
        Undefined = 0,
        RoadEdgeBoundary = 1,
        RoadEdgeMedian = 2,
        BoundaryUnknown = 3,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StopSign {
    #[prost(string, repeated, tag = "1")]
    pub lane: Vec<String>,
    #[prost(message, optional, tag = "2")]
    pub position: Option<MapPoint>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Crosswalk {
    #[prost(message, repeated, tag = "1")]
    pub polygon: Vec<MapPoint>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TrafficSignalLaneState {
    #[prost(int64, optional, tag = "1")]
    pub lane: Option<i64>,
    #[prost(enumeration = "traffic_signal_lane_state::State", optional, tag = "2")]
    pub state: Option<i32>,
}

pub mod traffic_signal_lane_state {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum State {
        Unknown = 0,
        ArrowStop = 1,
        ArrowCaution = 2,
        ArrowGo = 3,
        Stop = 4,
        Caution = 5,
        Go = 6,
        FlashingStop = 7,
        FlashingCaution = 8,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DynamicMapState {
    #[prost(message, repeated, tag = "1")]
    pub lane_states: Vec<TrafficSignalLaneState>,
}
