//! Sample observations shared by unit and behaviour tests.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    GeometryEngine, GeometryError, NodeType, ObservationError, SatelliteObservation, Sensor,
};

/// Footprint used by the sample observation.
pub const SAMPLE_BOUNDS: &str = "POLYGON((10 5, 10 7, 12 7, 12 5, 10 5))";

/// Ground track used by the sample observation.
pub const SAMPLE_TRACK: &str = "LINESTRING(11 5, 11 7)";

/// Errors raised while assembling sample data.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// A sample geometry failed to parse.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// The sample interval was inverted.
    #[error(transparent)]
    Observation(#[from] ObservationError),
}

/// Instant `millis` milliseconds after the Unix epoch.
///
/// Out-of-range values fall back to the epoch.
#[must_use]
pub fn millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Build an ascending observation over `[start, stop]` with the sample
/// footprint and a single time axis spanning the whole interval.
///
/// # Errors
/// Returns [`FixtureError`] when `stop` precedes `start`.
pub fn sample_observation(
    engine: &dyn GeometryEngine,
    sensor_name: &str,
    path: &str,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> Result<SatelliteObservation, FixtureError> {
    let bounds = engine.parse(SAMPLE_BOUNDS)?;
    let track = engine.parse(SAMPLE_TRACK)?.into_line_string()?;
    let axis = engine.create_time_axis(track, start, stop)?;
    Ok(
        SatelliteObservation::new(Sensor::new(sensor_name), path, start, stop)?
            .with_node_type(NodeType::Ascending)
            .with_version("v1.0")
            .with_geo_bounds(bounds)
            .with_time_axes(vec![axis]),
    )
}
