//! Geometry adapter.
//!
//! Footprints and ground tracks are held as [`Geometry`] values with `geo`
//! payloads. A [`GeometryEngine`] decides how coordinates are normalised,
//! how WKT is written and how tracks are measured. Two engines exist:
//! [`PlanarEngine`] treats longitude and latitude as a flat plane, and
//! [`SphericalEngine`] works on the unit sphere so tracks crossing the
//! antimeridian or passing near a pole are measured correctly. A catalog binds
//! exactly one engine for its lifetime.

mod error;
mod geojson;
mod planar;
mod spherical;
mod wkt;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::{LineString, MultiLineString, MultiPolygon, Point, Polygon};
use serde_json::Value;

use crate::time_axis::{TimeAxis, TrackMetric};

pub use error::GeometryError;
pub use planar::PlanarEngine;
pub use spherical::SphericalEngine;

pub(crate) use planar::{
    length as planar_length, locate as planar_locate, position as planar_position,
};
pub(crate) use spherical::{
    length as spherical_length, locate as spherical_locate, position as spherical_position,
};

/// A footprint, track or composite of both.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A single position.
    Point(Point),
    /// A ground track or polygon side.
    LineString(LineString),
    /// Several tracks, e.g. a track split at the antimeridian.
    MultiLineString(MultiLineString),
    /// A simple footprint.
    Polygon(Polygon),
    /// A footprint made of disjoint parts.
    MultiPolygon(MultiPolygon),
    /// An ordered composite footprint.
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// WKT-style type name of the variant.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::MultiLineString(_) => "MultiLineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
            Self::Collection(_) => "GeometryCollection",
        }
    }

    /// Take the line out of a [`Geometry::LineString`].
    ///
    /// # Errors
    /// Returns [`GeometryError::UnsupportedGeometry`] for every other variant.
    pub fn into_line_string(self) -> Result<LineString, GeometryError> {
        match self {
            Self::LineString(line) => Ok(line),
            other => Err(GeometryError::UnsupportedGeometry {
                kind: other.type_name(),
            }),
        }
    }

    /// Convert a `geo` geometry, rejecting types the catalog does not model.
    pub(crate) fn from_geo(geometry: geo::Geometry) -> Result<Self, GeometryError> {
        match geometry {
            geo::Geometry::Point(point) => Ok(Self::Point(point)),
            geo::Geometry::LineString(line) => Ok(Self::LineString(line)),
            geo::Geometry::MultiLineString(lines) => Ok(Self::MultiLineString(lines)),
            geo::Geometry::Polygon(polygon) => Ok(Self::Polygon(polygon)),
            geo::Geometry::MultiPolygon(polygons) => Ok(Self::MultiPolygon(polygons)),
            geo::Geometry::GeometryCollection(collection) => collection
                .into_iter()
                .map(Self::from_geo)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Collection),
            geo::Geometry::MultiPoint(_) => Err(unsupported("MultiPoint")),
            geo::Geometry::Line(_) => Err(unsupported("Line")),
            geo::Geometry::Rect(_) => Err(unsupported("Rect")),
            geo::Geometry::Triangle(_) => Err(unsupported("Triangle")),
        }
    }
}

const fn unsupported(kind: &'static str) -> GeometryError {
    GeometryError::UnsupportedGeometry { kind }
}

impl From<Point> for Geometry {
    fn from(value: Point) -> Self {
        Self::Point(value)
    }
}

impl From<LineString> for Geometry {
    fn from(value: LineString) -> Self {
        Self::LineString(value)
    }
}

impl From<Polygon> for Geometry {
    fn from(value: Polygon) -> Self {
        Self::Polygon(value)
    }
}

impl From<MultiPolygon> for Geometry {
    fn from(value: MultiPolygon) -> Self {
        Self::MultiPolygon(value)
    }
}

/// Which engine a catalog is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Flat longitude/latitude plane.
    Planar,
    /// Unit sphere.
    Spherical,
}

impl EngineKind {
    /// Metric used by time axes created with this engine.
    #[must_use]
    pub const fn metric(self) -> TrackMetric {
        match self {
            Self::Planar => TrackMetric::Planar,
            Self::Spherical => TrackMetric::Spherical,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Planar => "planar",
            Self::Spherical => "spherical",
        })
    }
}

/// Encoding requested from [`GeometryEngine::to_native`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFormat {
    /// WKT literal for `ST_GeomFromText` style functions.
    Wkt,
    /// GeoJSON object for document stores.
    GeoJson,
}

/// A geometry in a backend's own encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeGeometry {
    /// WKT text.
    Wkt(String),
    /// GeoJSON geometry object.
    GeoJson(Value),
}

/// Strategy for parsing, formatting and measuring geometries.
pub trait GeometryEngine: Send + Sync + fmt::Debug {
    /// Identify the engine.
    fn kind(&self) -> EngineKind;

    /// Bring freshly decoded coordinates into the engine's canonical form.
    fn normalize(&self, geometry: Geometry) -> Geometry;

    /// Render a geometry as WKT in the engine's house style.
    fn format(&self, geometry: &Geometry) -> String;

    /// Parse WKT text.
    ///
    /// # Errors
    /// Returns [`GeometryError::Parse`] carrying the offending text when it is
    /// not valid WKT, or [`GeometryError::UnsupportedGeometry`] for types the
    /// catalog does not model.
    fn parse(&self, text: &str) -> Result<Geometry, GeometryError> {
        wkt::parse(text).map(|geometry| self.normalize(geometry))
    }

    /// Combine footprint parts: a single part is returned as is, several
    /// become a [`Geometry::Collection`].
    fn compose(&self, mut parts: Vec<Geometry>) -> Geometry {
        if parts.len() == 1
            && let Some(single) = parts.pop()
        {
            return single;
        }
        Geometry::Collection(parts)
    }

    /// Pair a ground track with its acquisition interval.
    ///
    /// # Errors
    /// Returns [`GeometryError::InvalidTimeAxis`] when the track has fewer than
    /// two vertices, zero length, or ends before it starts.
    fn create_time_axis(
        &self,
        track: LineString,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<TimeAxis, GeometryError> {
        let line = self
            .normalize(Geometry::LineString(track))
            .into_line_string()?;
        TimeAxis::new(line, start_time, end_time, self.kind().metric())
    }

    /// Encode a geometry for a backend.
    fn to_native(&self, geometry: &Geometry, format: NativeFormat) -> NativeGeometry {
        match format {
            NativeFormat::Wkt => NativeGeometry::Wkt(self.format(geometry)),
            NativeFormat::GeoJson => NativeGeometry::GeoJson(geojson::to_value(geometry)),
        }
    }

    /// Decode a geometry read back from a backend.
    ///
    /// # Errors
    /// Propagates WKT parse failures and rejects malformed GeoJSON with
    /// [`GeometryError::InvalidGeoJson`].
    fn from_native(&self, native: &NativeGeometry) -> Result<Geometry, GeometryError> {
        match native {
            NativeGeometry::Wkt(text) => self.parse(text),
            NativeGeometry::GeoJson(value) => {
                geojson::from_value(value).map(|geometry| self.normalize(geometry))
            }
        }
    }
}

/// Construct the engine for `kind`, ready to be shared by a catalog.
#[must_use]
pub fn engine_for(kind: EngineKind) -> Arc<dyn GeometryEngine> {
    match kind {
        EngineKind::Planar => Arc::new(PlanarEngine),
        EngineKind::Spherical => Arc::new(SphericalEngine),
    }
}
