//! Unit coverage for the shared relational row handling.

use chrono::TimeZone;
use rstest::{fixture, rstest};
use satcat_core::test_support::{SAMPLE_BOUNDS, SAMPLE_TRACK};
use satcat_core::{Geometry, PlanarEngine};

use super::*;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
}

#[fixture]
fn row() -> ObservationRow {
    ObservationRow {
        id: 1,
        start_time: at(1_000),
        stop_time: at(2_000),
        node_type: 1,
        geo_bounds: Some(SAMPLE_BOUNDS.to_owned()),
        version: Some(String::from("v1")),
        data_file: String::from("/data/one.nc"),
        sensor_id: Some(7),
        sensor_name: String::from("amsub-n15"),
        axis: Some(AxisRow {
            track: SAMPLE_TRACK.to_owned(),
            start_time: at(1_000),
            stop_time: at(1_500),
        }),
    }
}

#[rstest]
fn rows_of_one_observation_collapse(row: ObservationRow) {
    let mut second = row.clone();
    if let Some(axis) = second.axis.as_mut() {
        axis.start_time = at(1_500);
        axis.stop_time = at(2_000);
    }
    let mut other = row.clone();
    other.id = 2;
    other.axis = None;
    other.geo_bounds = None;

    let observations = assemble(vec![row, second, other], &PlanarEngine).expect("valid rows");

    assert_eq!(observations.len(), 2);
    let first = observations.first().expect("first observation");
    assert_eq!(first.time_axes.len(), 2);
    assert_eq!(first.node_type, NodeType::Descending);
    assert_eq!(first.sensor.id, Some(7));
    assert!(matches!(first.geo_bounds, Some(Geometry::Polygon(_))));
    let last = observations.last().expect("second observation");
    assert!(last.time_axes.is_empty());
    assert!(last.geo_bounds.is_none());
}

#[rstest]
fn unknown_node_type_is_a_decode_error(mut row: ObservationRow) {
    row.node_type = 9;
    let err = assemble(vec![row], &PlanarEngine).expect_err("node type 9 is unknown");
    assert!(matches!(
        err,
        DriverError::Decode {
            column: "NodeType",
            ..
        }
    ));
}

#[rstest]
fn missing_version_reads_as_empty(mut row: ObservationRow) {
    row.version = None;
    let observations = assemble(vec![row], &PlanarEngine).expect("valid rows");
    assert_eq!(
        observations.first().map(|observation| observation.version.as_str()),
        Some("")
    );
}

#[rstest]
#[case(QueryParameter::default().with_sensor_name("a").with_path("/p"), true)]
#[case(QueryParameter::default().with_sensor_name("a"), false)]
#[case(QueryParameter::default().with_path("/p"), false)]
#[case(QueryParameter::default().with_sensor_name("").with_path("/p"), false)]
fn unique_key_requires_sensor_and_path(#[case] parameter: QueryParameter, #[case] usable: bool) {
    let key = unique_key_query(&parameter);
    assert_eq!(key.is_some(), usable);
    if let Some(query) = key {
        assert_eq!(query.page_size, Some(1));
        assert!(query.start_time.is_none());
    }
}
