//! SQL fragment assembly shared by the relational drivers.
//!
//! Everything here is a pure function of a [`QueryParameter`]: no connection
//! is touched and nothing can fail. Other tools compare the generated text
//! directly, so keyword case and spacing are part of the contract. Predicates
//! are emitted in a fixed order: time overlap (`stopDate >= start`,
//! `startDate <= stop`), sensor name, data file, version.

use chrono::{DateTime, NaiveDateTime, ParseError, Utc};
use satcat_core::QueryParameter;

const JOINED_SELECT: &str = concat!(
    " FROM SATELLITE_OBSERVATION obs",
    " INNER JOIN SENSOR sen ON obs.SensorId = sen.ID",
    " LEFT OUTER JOIN TIMEAXIS axis ON obs.ID = axis.ObservationId"
);
const JOINED_ORDER: &str = " ORDER by obs.ID ";
const PAGE_SELECT: &str = concat!(
    "SELECT obs.ID FROM SATELLITE_OBSERVATION obs",
    " INNER JOIN SENSOR sen ON obs.SensorId = sen.ID"
);
/// Row count standing in for "no limit" when only an offset is given.
const UNBOUNDED_PAGE: i64 = i64::MAX;
const LEAN_SELECT: &str = " FROM SATELLITE_OBSERVATION";
const LEAN_ORDER: &str = " ORDER by ID ";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Render an instant as a SQL timestamp literal body, in UTC.
///
/// The fraction of a second is written in its shortest form with at least
/// one digit, so text order matches time order.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use satcat_store::sql::format_timestamp;
///
/// let instant = Utc.with_ymd_and_hms(2011, 3, 13, 7, 6, 40).unwrap();
/// assert_eq!(format_timestamp(instant), "2011-03-13 07:06:40.0");
/// ```
#[must_use]
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    let nanos = instant.timestamp_subsec_nanos().min(999_999_999);
    let padded = format!("{nanos:09}");
    let trimmed = padded.trim_end_matches('0');
    let fraction = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{}.{fraction}", instant.format(TIMESTAMP_FORMAT))
}

/// Read back a literal written by [`format_timestamp`] or a database's
/// default timestamp text.
///
/// # Errors
/// Returns the `chrono` parse error for text in any other layout.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ParseError> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_PARSE_FORMAT).map(|naive| naive.and_utc())
}

/// Whether `parameter` carries any criterion that produces a predicate.
///
/// `None`, an empty parameter, paging-only parameters and empty strings all
/// yield `false`.
#[must_use]
pub fn has_where_clause(parameter: Option<&QueryParameter>) -> bool {
    parameter.is_some_and(QueryParameter::has_search_criteria)
}

/// The joined query over observations, sensors and time axes.
///
/// ```
/// use satcat_store::sql::create_sql;
///
/// assert_eq!(
///     create_sql(None),
///     "SELECT * FROM SATELLITE_OBSERVATION obs INNER JOIN SENSOR sen ON obs.SensorId = sen.ID \
///      LEFT OUTER JOIN TIMEAXIS axis ON obs.ID = axis.ObservationId ORDER by obs.ID "
/// );
/// ```
#[must_use]
pub fn create_sql(parameter: Option<&QueryParameter>) -> String {
    create_sql_with_projection("*", parameter)
}

/// [`create_sql`] with a custom column list in place of `*`.
#[must_use]
pub fn create_sql_with_projection(projection: &str, parameter: Option<&QueryParameter>) -> String {
    let mut sql = format!("SELECT {projection}{JOINED_SELECT}");
    append_where_clause(parameter, &mut sql);
    sql.push_str(JOINED_ORDER);
    append_limit_and_offset(parameter, &mut sql);
    sql
}

/// [`create_sql_with_projection`] with paging applied to observations
/// instead of joined rows.
///
/// Each time axis adds a row to the joined result, so a plain `LIMIT` would
/// split an observation's axes across pages. Here the page is chosen by id in
/// a sub-select and every axis of a selected observation is returned.
/// Without paging the text equals [`create_sql_with_projection`].
///
/// ```
/// use satcat_core::QueryParameter;
/// use satcat_store::sql::create_paged_sql_with_projection;
///
/// let parameter = QueryParameter::default().with_page_size(2);
/// assert!(
///     create_paged_sql_with_projection("*", Some(&parameter))
///         .ends_with("WHERE obs.ID IN (SELECT obs.ID FROM SATELLITE_OBSERVATION obs \
///                     INNER JOIN SENSOR sen ON obs.SensorId = sen.ID \
///                     ORDER by obs.ID  LIMIT 2 OFFSET 0) ORDER by obs.ID ")
/// );
/// ```
#[must_use]
pub fn create_paged_sql_with_projection(
    projection: &str,
    parameter: Option<&QueryParameter>,
) -> String {
    let Some(paging) =
        parameter.filter(|candidate| candidate.page_size.is_some() || candidate.offset.is_some())
    else {
        return create_sql_with_projection(projection, parameter);
    };
    let mut page = String::from(PAGE_SELECT);
    append_where_clause(parameter, &mut page);
    page.push_str(JOINED_ORDER);
    let limit = paging.page_size.map_or(UNBOUNDED_PAGE, i64::from);
    let offset = paging.offset.unwrap_or(0);
    format!(
        "SELECT {projection}{JOINED_SELECT} WHERE obs.ID IN ({page} LIMIT {limit} OFFSET {offset})\
         {JOINED_ORDER}"
    )
}

/// The un-joined query over the observation table alone.
///
/// Applies the same ordered predicates as [`create_sql`]; the sensor
/// criterion is resolved through a sub-select on the sensor table.
#[must_use]
pub fn create_observation_sql(parameter: Option<&QueryParameter>) -> String {
    create_observation_sql_with_projection("*", parameter)
}

/// [`create_observation_sql`] with a custom column list in place of `*`.
#[must_use]
pub fn create_observation_sql_with_projection(
    projection: &str,
    parameter: Option<&QueryParameter>,
) -> String {
    let mut sql = format!("SELECT {projection}{LEAN_SELECT}");
    if let Some(criteria) = parameter.filter(|candidate| candidate.has_search_criteria()) {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates(criteria, &LEAN_COLUMNS).join(" AND "));
    }
    sql.push_str(LEAN_ORDER);
    append_limit_and_offset(parameter, &mut sql);
    sql
}

/// Append ` WHERE ...` for the joined query, or nothing without criteria.
pub fn append_where_clause(parameter: Option<&QueryParameter>, sql: &mut String) {
    let Some(criteria) = parameter.filter(|candidate| candidate.has_search_criteria()) else {
        return;
    };
    sql.push_str(" WHERE ");
    sql.push_str(&predicates(criteria, &JOINED_COLUMNS).join(" AND "));
}

/// Append ` LIMIT n`, ` OFFSET m` or both, in that order.
///
/// ```
/// use satcat_core::QueryParameter;
/// use satcat_store::sql::append_limit_and_offset;
///
/// let mut sql = String::new();
/// let parameter = QueryParameter::default().with_page_size(1000).with_offset(16389);
/// append_limit_and_offset(Some(&parameter), &mut sql);
/// assert_eq!(sql, " LIMIT 1000 OFFSET 16389");
/// ```
pub fn append_limit_and_offset(parameter: Option<&QueryParameter>, sql: &mut String) {
    let Some(paging) = parameter else {
        return;
    };
    if let Some(page_size) = paging.page_size {
        sql.push_str(&format!(" LIMIT {page_size}"));
    }
    if let Some(offset) = paging.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
}

/// Column names used by one query variant.
struct Columns {
    stop_date: &'static str,
    start_date: &'static str,
    sensor: &'static str,
    sensor_suffix: &'static str,
    data_file: &'static str,
    version: &'static str,
}

const JOINED_COLUMNS: Columns = Columns {
    stop_date: "obs.stopDate",
    start_date: "obs.startDate",
    sensor: "sen.Name = ",
    sensor_suffix: "",
    data_file: "obs.DataFile",
    version: "obs.Version",
};

const LEAN_COLUMNS: Columns = Columns {
    stop_date: "stopDate",
    start_date: "startDate",
    sensor: "SensorId = (SELECT ID FROM SENSOR WHERE Name = ",
    sensor_suffix: ")",
    data_file: "DataFile",
    version: "Version",
};

fn predicates(parameter: &QueryParameter, columns: &Columns) -> Vec<String> {
    let mut out = Vec::with_capacity(5);
    if let Some(start) = parameter.start_time {
        out.push(format!(
            "{} >= '{}'",
            columns.stop_date,
            format_timestamp(start)
        ));
    }
    if let Some(stop) = parameter.stop_time {
        out.push(format!(
            "{} <= '{}'",
            columns.start_date,
            format_timestamp(stop)
        ));
    }
    if let Some(sensor) = parameter.sensor_name() {
        out.push(format!(
            "{}{}{}",
            columns.sensor,
            quote(sensor),
            columns.sensor_suffix
        ));
    }
    if let Some(path) = parameter.path() {
        out.push(format!("{} = {}", columns.data_file, quote(path)));
    }
    if let Some(version) = parameter.version() {
        out.push(format!("{} = {}", columns.version, quote(version)));
    }
    out
}

/// Wrap `value` in single quotes, doubling any embedded quote.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
