//! Ground-track time axes.
//!
//! A [`TimeAxis`] pairs a track with the interval it was flown in. Acquisition
//! time for a position is interpolated from how far along the track the
//! position projects, measured with the metric of the engine that built the
//! axis.

use chrono::{DateTime, TimeDelta, Utc};
use geo::{BooleanOps, Coord, LineString, MultiLineString, Point, Polygon};

use crate::geometry::GeometryError;

/// How distances along a track are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackMetric {
    /// Euclidean distance in degrees.
    Planar,
    /// Great-circle arc length.
    Spherical,
}

impl TrackMetric {
    fn length(self, line: &LineString) -> f64 {
        match self {
            Self::Planar => crate::geometry::planar_length(line),
            Self::Spherical => crate::geometry::spherical_length(line),
        }
    }

    fn locate(self, line: &LineString, point: Coord) -> Option<f64> {
        match self {
            Self::Planar => crate::geometry::planar_locate(line, point),
            Self::Spherical => crate::geometry::spherical_locate(line, point),
        }
    }

    fn position(self, line: &LineString, point: Coord) -> Option<f64> {
        match self {
            Self::Planar => crate::geometry::planar_position(line, point),
            Self::Spherical => crate::geometry::spherical_position(line, point),
        }
    }
}

/// A closed time interval with `start <= stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Inclusive end.
    pub stop: DateTime<Utc>,
}

/// A ground track paired with its acquisition interval.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    geometry: LineString,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    metric: TrackMetric,
}

impl TimeAxis {
    /// Validate and build an axis.
    ///
    /// Engines call this through
    /// [`GeometryEngine::create_time_axis`](crate::GeometryEngine::create_time_axis),
    /// which also normalises the track.
    ///
    /// # Errors
    /// Returns [`GeometryError::InvalidTimeAxis`] when the track has fewer than
    /// two vertices or no measurable length, or when `end_time` precedes
    /// `start_time`.
    pub fn new(
        geometry: LineString,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        metric: TrackMetric,
    ) -> Result<Self, GeometryError> {
        if geometry.0.len() < 2 {
            return Err(GeometryError::InvalidTimeAxis {
                reason: "track needs at least two vertices",
            });
        }
        if end_time < start_time {
            return Err(GeometryError::InvalidTimeAxis {
                reason: "track ends before it starts",
            });
        }
        let length = metric.length(&geometry);
        if !length.is_finite() || length <= f64::EPSILON {
            return Err(GeometryError::InvalidTimeAxis {
                reason: "track has zero length",
            });
        }
        Ok(Self {
            geometry,
            start_time,
            end_time,
            metric,
        })
    }

    /// The ground track.
    #[must_use]
    pub const fn geometry(&self) -> &LineString {
        &self.geometry
    }

    /// Time at the first vertex.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Time at the last vertex.
    #[must_use]
    pub const fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Metric used to measure the track.
    #[must_use]
    pub const fn metric(&self) -> TrackMetric {
        self.metric
    }

    /// Time spent flying the track.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end_time.signed_duration_since(self.start_time)
    }

    /// Interpolated acquisition time for `point`.
    ///
    /// Returns `None` when the point does not project onto the track.
    #[must_use]
    pub fn time_at(&self, point: &Point) -> Option<DateTime<Utc>> {
        let fraction = self.metric.locate(&self.geometry, point.0)?;
        self.start_time
            .checked_add_signed(scale_duration(self.duration(), fraction))
    }

    /// Interval covered by projecting the first and last vertex of `side`
    /// onto the track, earliest first.
    ///
    /// Returns `None` when either end does not project onto the track.
    #[must_use]
    pub fn projection_interval(&self, side: &LineString) -> Option<TimeInterval> {
        let first = side.0.first().copied().map(Point)?;
        let last = side.0.last().copied().map(Point)?;
        let from = self.time_at(&first)?;
        let to = self.time_at(&last)?;
        Some(TimeInterval {
            start: from.min(to),
            stop: from.max(to),
        })
    }

    /// Interval in which the track runs inside `footprint`.
    ///
    /// The track is clipped by the polygon in coordinate space. The interval
    /// runs from the earliest to the latest clipped position, measured along
    /// the track with the axis metric. Returns `None` when the track misses
    /// the footprint.
    #[must_use]
    pub fn intersection_time(&self, footprint: &Polygon) -> Option<TimeInterval> {
        let track = MultiLineString::new(vec![self.geometry.clone()]);
        let inside = footprint.clip(&track, false);
        let mut fractions = inside
            .iter()
            .flat_map(LineString::coords)
            .filter_map(|coord| self.metric.position(&self.geometry, *coord));
        let first = fractions.next()?;
        let (earliest, latest) = fractions.fold((first, first), |(low, high), fraction| {
            (low.min(fraction), high.max(fraction))
        });
        let duration = self.duration();
        Some(TimeInterval {
            start: self
                .start_time
                .checked_add_signed(scale_duration(duration, earliest))?,
            stop: self
                .start_time
                .checked_add_signed(scale_duration(duration, latest))?,
        })
    }
}

#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    reason = "interpolated offsets are rounded to whole milliseconds"
)]
fn scale_duration(duration: TimeDelta, fraction: f64) -> TimeDelta {
    let millis = (duration.num_milliseconds() as f64 * fraction).round() as i64;
    TimeDelta::milliseconds(millis)
}
