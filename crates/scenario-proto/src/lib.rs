//! Target wire schema for exported driving scenarios.
//!
//! The message types are hand-maintained prost derives mirroring the Waymo
//! Open Motion `Scenario` schema, so the crate builds without `protoc`.
//! See [`map`] for where field types and enum values extend upstream.
//! [`tfrecord`] provides the length-and-CRC framing used to store them.

pub mod map;
pub mod scenario;
pub mod tfrecord;

// Flat re-exports so callers can write `pb::Scenario`, `pb::map_feature::FeatureData`, ...
pub use map::*;
pub use scenario::*;
pub use tfrecord::{RecordError, RecordReader, RecordWriter};

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use std::fs::File;
    use std::io::{BufReader, BufWriter};
    use tempfile::tempdir;

    fn sample() -> Scenario {
        Scenario {
            scenario_id: Some("abc".into()),
            timestamps_seconds: vec![0.0, 0.1],
            current_time_index: Some(1),
            sdc_track_index: Some(0),
            tracks: vec![Track {
                id: Some(7),
                object_type: Some(track::ObjectType::TypeVehicle as i32),
                states: vec![
                    ObjectState {
                        valid: Some(false),
                        ..Default::default()
                    },
                    ObjectState {
                        center_x: Some(1.0),
                        center_y: Some(2.0),
                        center_z: Some(0.5),
                        valid: Some(true),
                        ..Default::default()
                    },
                ],
            }],
            map_features: vec![MapFeature {
                id: Some(3),
                feature_data: Some(map_feature::FeatureData::Crosswalk(Crosswalk {
                    polygon: vec![MapPoint {
                        x: Some(1.0),
                        y: Some(1.0),
                        z: None,
                    }],
                })),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn scenario_survives_file_round_trip() {
        let td = tempdir().unwrap();
        let path = td.path().join("one.tfrecord");
        let scenario = sample();

        let mut writer = RecordWriter::new(BufWriter::new(File::create(&path).unwrap()));
        writer.write_message(&scenario).unwrap();
        writer.finish().unwrap();

        let mut reader = RecordReader::new(BufReader::new(File::open(&path).unwrap()));
        let back: Scenario = reader.read_message().unwrap().unwrap();
        assert_eq!(back, scenario);
        assert!(reader.read_message::<Scenario>().unwrap().is_none());
    }

    #[test]
    fn boundary_unknown_edges_use_the_extended_code() {
        let edge = RoadEdge {
            r#type: Some(road_edge::RoadEdgeType::BoundaryUnknown as i32),
            polyline: Vec::new(),
        };
        // tag 1, varint wire type, value 3
        assert_eq!(edge.encode_to_vec(), vec![0x08, 0x03]);
        let back = RoadEdge::decode(edge.encode_to_vec().as_slice()).unwrap();
        assert_eq!(back.r#type(), road_edge::RoadEdgeType::BoundaryUnknown);
    }

    #[test]
    fn unset_optional_fields_are_not_encoded() {
        let state = ObjectState {
            valid: Some(false),
            ..Default::default()
        };
        // tag 11, varint wire type, value 0
        assert_eq!(state.encode_to_vec(), vec![0x58, 0x00]);
    }
}
