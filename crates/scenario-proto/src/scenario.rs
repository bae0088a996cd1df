//! Scenario-level messages, numbered after `waymo_open_dataset/protos/scenario.proto`.

use crate::map::{DynamicMapState, MapFeature};

/// Agent state at one timestep. When `valid` is false every other field is
/// unset and must not be read.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct ObjectState {
    #[prost(double, optional, tag = "2")]
    pub center_x: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub center_y: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub center_z: Option<f64>,
    #[prost(float, optional, tag = "5")]
    pub length: Option<f32>,
    #[prost(float, optional, tag = "6")]
    pub width: Option<f32>,
    #[prost(float, optional, tag = "7")]
    pub height: Option<f32>,
    #[prost(float, optional, tag = "8")]
    pub heading: Option<f32>,
    #[prost(float, optional, tag = "9")]
    pub velocity_x: Option<f32>,
    #[prost(float, optional, tag = "10")]
    pub velocity_y: Option<f32>,
    #[prost(bool, optional, tag = "11")]
    pub valid: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Track {
    #[prost(int32, optional, tag = "1")]
    pub id: Option<i32>,
    #[prost(enumeration = "track::ObjectType", optional, tag = "2")]
    pub object_type: Option<i32>,
    #[prost(message, repeated, tag = "3")]
    pub states: Vec<ObjectState>,
}

pub mod track {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum ObjectType {
        TypeUnset = 0,
        TypeVehicle = 1,
        TypePedestrian = 2,
        TypeCyclist = 3,
        TypeOther = 4,
    }
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct RequiredPrediction {
    #[prost(int32, optional, tag = "1")]
    pub track_index: Option<i32>,
    #[prost(enumeration = "required_prediction::DifficultyLevel", optional, tag = "2")]
    pub difficulty: Option<i32>,
}

pub mod required_prediction {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum DifficultyLevel {
        None = 0,
        Level1 = 1,
        Level2 = 2,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Scenario {
    #[prost(double, repeated, packed = "false", tag = "1")]
    pub timestamps_seconds: Vec<f64>,
    #[prost(message, repeated, tag = "2")]
    pub tracks: Vec<Track>,
    #[prost(int32, repeated, packed = "false", tag = "4")]
    pub objects_of_interest: Vec<i32>,
    #[prost(string, optional, tag = "5")]
    pub scenario_id: Option<String>,
    #[prost(int32, optional, tag = "6")]
    pub sdc_track_index: Option<i32>,
    #[prost(message, repeated, tag = "7")]
    pub dynamic_map_states: Vec<DynamicMapState>,
    #[prost(message, repeated, tag = "8")]
    pub map_features: Vec<MapFeature>,
    #[prost(int32, optional, tag = "10")]
    pub current_time_index: Option<i32>,
    #[prost(message, repeated, tag = "11")]
    pub tracks_to_predict: Vec<RequiredPrediction>,
}
