#![expect(
    clippy::expect_used,
    reason = "tests should fail fast when setup breaks"
)]

//! Literal SQL text compared by external tooling.

use chrono::{DateTime, TimeZone, Utc};
use rstest::rstest;
use satcat_core::QueryParameter;
use satcat_store::sql::{append_limit_and_offset, create_sql, has_where_clause};

const BASE: &str = "SELECT * FROM SATELLITE_OBSERVATION obs \
    INNER JOIN SENSOR sen ON obs.SensorId = sen.ID \
    LEFT OUTER JOIN TIMEAXIS axis ON obs.ID = axis.ObservationId";

fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("valid calendar date")
}

#[rstest]
fn no_parameter_selects_everything() {
    assert_eq!(create_sql(None), format!("{BASE} ORDER by obs.ID "));
}

#[rstest]
fn start_time_filters_on_stop_date() {
    let parameter = QueryParameter::default().with_start_time(utc(2011, 3, 13, 7, 6, 40));
    assert_eq!(
        create_sql(Some(&parameter)),
        format!("{BASE} WHERE obs.stopDate >= '2011-03-13 07:06:40.0' ORDER by obs.ID ")
    );
}

#[rstest]
fn time_window_emits_both_overlap_predicates() {
    let parameter = QueryParameter::default()
        .with_start_time(utc(2011, 10, 30, 18, 40, 0))
        .with_stop_time(utc(2012, 2, 23, 12, 26, 40));
    assert_eq!(
        create_sql(Some(&parameter)),
        format!(
            "{BASE} WHERE obs.stopDate >= '2011-10-30 18:40:00.0' \
             AND obs.startDate <= '2012-02-23 12:26:40.0' ORDER by obs.ID "
        )
    );
}

#[rstest]
fn every_criterion_in_fixed_order() {
    let parameter = QueryParameter::default()
        .with_version("v1.1")
        .with_path("/archive/amsub.nc")
        .with_sensor_name("amsub-n15")
        .with_stop_time(utc(2012, 2, 23, 12, 26, 40))
        .with_start_time(utc(2011, 10, 30, 18, 40, 0))
        .with_page_size(10)
        .with_offset(20);
    assert_eq!(
        create_sql(Some(&parameter)),
        format!(
            "{BASE} WHERE obs.stopDate >= '2011-10-30 18:40:00.0' \
             AND obs.startDate <= '2012-02-23 12:26:40.0' \
             AND sen.Name = 'amsub-n15' AND obs.DataFile = '/archive/amsub.nc' \
             AND obs.Version = 'v1.1' ORDER by obs.ID  LIMIT 10 OFFSET 20"
        )
    );
}

#[rstest]
#[case(None, false)]
#[case(Some(QueryParameter::default()), false)]
#[case(Some(QueryParameter::default().with_page_size(25).with_offset(8744)), false)]
#[case(Some(QueryParameter::default().with_path("/data/file.nc")), true)]
fn where_clause_detection(#[case] parameter: Option<QueryParameter>, #[case] expected: bool) {
    assert_eq!(has_where_clause(parameter.as_ref()), expected);
}

#[rstest]
#[case(QueryParameter::default(), "")]
#[case(QueryParameter::default().with_page_size(128), " LIMIT 128")]
#[case(QueryParameter::default().with_offset(16388), " OFFSET 16388")]
#[case(
    QueryParameter::default().with_page_size(1000).with_offset(16389),
    " LIMIT 1000 OFFSET 16389"
)]
fn limit_and_offset(#[case] parameter: QueryParameter, #[case] expected: &str) {
    let mut sql = String::new();
    append_limit_and_offset(Some(&parameter), &mut sql);
    assert_eq!(sql, expected);
}
