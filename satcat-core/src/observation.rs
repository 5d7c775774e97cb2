//! Observation data model.
//!
//! A [`SatelliteObservation`] describes one source product: the sensor that
//! recorded it, its acquisition interval, its footprint and the ground tracks
//! needed to interpolate acquisition time along the swath.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::geometry::Geometry;
use crate::time_axis::TimeAxis;

/// Orbit node of the satellite while acquiring an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeType {
    /// Satellite moving northwards.
    Ascending,
    /// Satellite moving southwards.
    Descending,
    /// Node unknown or not applicable (e.g. mixed or geostationary data).
    #[default]
    Undefined,
}

/// Error returned by [`NodeType::from_id`] for ids outside the known range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown node type id {id}")]
pub struct NodeTypeError {
    /// The rejected identifier.
    pub id: i32,
}

impl NodeType {
    /// Numeric identifier used by the storage backends.
    ///
    /// # Examples
    /// ```
    /// use satcat_core::NodeType;
    ///
    /// assert_eq!(NodeType::Descending.to_id(), 1);
    /// ```
    #[must_use]
    pub const fn to_id(self) -> i32 {
        match self {
            Self::Ascending => 0,
            Self::Descending => 1,
            Self::Undefined => 2,
        }
    }

    /// Resolve a stored identifier back into a [`NodeType`].
    pub const fn from_id(id: i32) -> Result<Self, NodeTypeError> {
        match id {
            0 => Ok(Self::Ascending),
            1 => Ok(Self::Descending),
            2 => Ok(Self::Undefined),
            _ => Err(NodeTypeError { id }),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ascending => "ASCENDING",
            Self::Descending => "DESCENDING",
            Self::Undefined => "UNDEFINED",
        };
        f.write_str(label)
    }
}

/// An instrument whose products are catalogued.
///
/// Sensors are identified by their case-sensitive name. The backend id is
/// assigned on first insert and is `None` for sensors that have not been
/// persisted, or for backends that embed the sensor in each observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sensor {
    /// Backend-assigned identifier.
    pub id: Option<i64>,
    /// Unique sensor name, e.g. `avhrr-n18`.
    pub name: String,
}

impl Sensor {
    /// Construct an unsaved sensor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// Errors returned when constructing a [`SatelliteObservation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    /// The acquisition interval ends before it starts.
    #[error("observation stops at {stop} which is before its start at {start}")]
    InvertedTimeRange {
        /// Start of the rejected interval.
        start: DateTime<Utc>,
        /// End of the rejected interval.
        stop: DateTime<Utc>,
    },
}

/// One sensor's footprint and acquisition interval for a single product.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use satcat_core::{NodeType, SatelliteObservation, Sensor};
///
/// # fn main() -> Result<(), satcat_core::ObservationError> {
/// let start = Utc.timestamp_millis_opt(1_430_000_000_000).unwrap();
/// let stop = Utc.timestamp_millis_opt(1_430_001_000_000).unwrap();
/// let sensor = Sensor::new("amsub-n16");
/// let observation = SatelliteObservation::new(sensor, "/data/a.h5", start, stop)?
///     .with_node_type(NodeType::Ascending)
///     .with_version("v1.0");
/// assert_eq!(observation.sensor.name, "amsub-n16");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteObservation {
    /// Start of acquisition.
    pub start_time: DateTime<Utc>,
    /// End of acquisition, never before `start_time`.
    pub stop_time: DateTime<Utc>,
    /// Orbit node during acquisition.
    pub node_type: NodeType,
    /// Product processing version.
    pub version: String,
    /// Location of the product file.
    pub data_file_path: String,
    /// The recording instrument.
    pub sensor: Sensor,
    /// Footprint; composite footprints use [`Geometry::Collection`].
    pub geo_bounds: Option<Geometry>,
    /// Ground tracks in acquisition order.
    pub time_axes: Vec<TimeAxis>,
}

impl SatelliteObservation {
    /// Validate the acquisition interval and construct an observation with no
    /// footprint, no time axes, an undefined node and an empty version.
    pub fn new(
        sensor: Sensor,
        data_file_path: impl Into<String>,
        start_time: DateTime<Utc>,
        stop_time: DateTime<Utc>,
    ) -> Result<Self, ObservationError> {
        if stop_time < start_time {
            return Err(ObservationError::InvertedTimeRange {
                start: start_time,
                stop: stop_time,
            });
        }
        Ok(Self {
            start_time,
            stop_time,
            node_type: NodeType::Undefined,
            version: String::new(),
            data_file_path: data_file_path.into(),
            sensor,
            geo_bounds: None,
            time_axes: Vec::new(),
        })
    }

    /// Set the orbit node.
    #[must_use]
    pub const fn with_node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    /// Set the processing version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the footprint.
    #[must_use]
    pub fn with_geo_bounds(mut self, geo_bounds: Geometry) -> Self {
        self.geo_bounds = Some(geo_bounds);
        self
    }

    /// Replace the ground tracks.
    #[must_use]
    pub fn with_time_axes(mut self, time_axes: Vec<TimeAxis>) -> Self {
        self.time_axes = time_axes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(NodeType::Ascending)]
    #[case(NodeType::Descending)]
    #[case(NodeType::Undefined)]
    fn node_type_ids_resolve_back(#[case] node_type: NodeType) {
        assert_eq!(NodeType::from_id(node_type.to_id()), Ok(node_type));
    }

    #[rstest]
    #[case(-1)]
    #[case(3)]
    fn node_type_rejects_unknown_ids(#[case] id: i32) {
        assert_eq!(NodeType::from_id(id), Err(NodeTypeError { id }));
    }

    #[rstest]
    fn observation_rejects_inverted_interval() {
        let start = Utc.timestamp_opt(1_001_000, 0).single().expect("valid");
        let stop = Utc.timestamp_opt(1_000_000, 0).single().expect("valid");
        let result = SatelliteObservation::new(Sensor::new("mhs-n18"), "a.nc", start, stop);
        assert!(matches!(
            result,
            Err(ObservationError::InvertedTimeRange { .. })
        ));
    }

    #[rstest]
    fn observation_accepts_instantaneous_interval() {
        let instant = Utc.timestamp_opt(1_000_000, 0).single().expect("valid");
        let observation =
            SatelliteObservation::new(Sensor::new("mhs-n18"), "a.nc", instant, instant)
                .expect("zero-length interval is valid");
        assert_eq!(observation.node_type, NodeType::Undefined);
        assert!(observation.time_axes.is_empty());
        assert!(observation.geo_bounds.is_none());
    }
}
