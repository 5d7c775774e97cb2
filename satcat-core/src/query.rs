//! Search criteria shared by every backend.

use chrono::{DateTime, Utc};

use crate::geometry::Geometry;

/// Criteria for [`SatelliteObservation`](crate::SatelliteObservation) lookups.
///
/// Every field is optional. Time criteria select observations whose interval
/// overlaps the requested one; text criteria match exactly. The object does
/// not validate itself: consumers decide how to treat odd combinations.
///
/// # Examples
/// ```
/// use satcat_core::QueryParameter;
///
/// let paging = QueryParameter::default().with_page_size(25).with_offset(8744);
/// assert!(!paging.has_search_criteria());
///
/// let by_path = QueryParameter::default().with_path("/archive/a.nc");
/// assert!(by_path.has_search_criteria());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParameter {
    /// Keep observations ending at or after this instant.
    pub start_time: Option<DateTime<Utc>>,
    /// Keep observations starting at or before this instant.
    pub stop_time: Option<DateTime<Utc>>,
    /// Exact sensor name.
    pub sensor_name: Option<String>,
    /// Exact data file path.
    pub path: Option<String>,
    /// Exact processing version.
    pub version: Option<String>,
    /// Footprint intersection filter.
    pub geometry: Option<Geometry>,
    /// Maximum number of rows to return.
    pub page_size: Option<u32>,
    /// Number of rows to skip.
    pub offset: Option<u32>,
}

impl QueryParameter {
    /// Set the lower bound of the overlap window.
    #[must_use]
    pub const fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Set the upper bound of the overlap window.
    #[must_use]
    pub const fn with_stop_time(mut self, stop_time: DateTime<Utc>) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    /// Restrict to one sensor.
    #[must_use]
    pub fn with_sensor_name(mut self, sensor_name: impl Into<String>) -> Self {
        self.sensor_name = Some(sensor_name.into());
        self
    }

    /// Restrict to one data file.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Restrict to one processing version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Restrict to footprints intersecting `geometry`.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Limit the number of returned rows.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Skip leading rows.
    #[must_use]
    pub const fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sensor name, or `None` when unset or empty.
    #[must_use]
    pub fn sensor_name(&self) -> Option<&str> {
        non_empty(self.sensor_name.as_deref())
    }

    /// Data file path, or `None` when unset or empty.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        non_empty(self.path.as_deref())
    }

    /// Processing version, or `None` when unset or empty.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        non_empty(self.version.as_deref())
    }

    /// Whether any time or text criterion is set.
    ///
    /// Paging fields never count, and empty strings count as unset. The
    /// geometry criterion is not part of the textual query and is ignored.
    #[must_use]
    pub fn has_search_criteria(&self) -> bool {
        self.start_time.is_some()
            || self.stop_time.is_some()
            || self.sensor_name().is_some()
            || self.path().is_some()
            || self.version().is_some()
    }

    /// Criteria identifying one stored product: sensor name and path only.
    #[must_use]
    pub fn unique_key(&self) -> Self {
        Self {
            sensor_name: self.sensor_name.clone(),
            path: self.path.clone(),
            ..Self::default()
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}
