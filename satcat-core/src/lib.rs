//! Core domain types for the satellite observation catalog.
//!
//! The crate holds everything a catalog backend needs but that does not touch
//! a connection:
//! - the observation data model ([`SatelliteObservation`], [`Sensor`],
//!   [`NodeType`]) and the ground-track [`TimeAxis`];
//! - the [`QueryParameter`] search contract shared by every backend;
//! - the geometry adapter: the [`GeometryEngine`] strategy with its planar and
//!   spherical implementations, plus WKT and GeoJSON codecs.
//!
//! # Examples
//!
//! ```
//! use satcat_core::{GeometryEngine, PlanarEngine};
//!
//! # fn main() -> Result<(), satcat_core::GeometryError> {
//! let engine = PlanarEngine;
//! let polygon = engine.parse("POLYGON((10 5, 10 7, 12 7, 12 5, 10 5))")?;
//! assert_eq!(engine.format(&polygon), "POLYGON ((10 5, 10 7, 12 7, 12 5, 10 5))");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod geometry;
mod observation;
mod query;
mod time_axis;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use geometry::{
    EngineKind, Geometry, GeometryEngine, GeometryError, NativeFormat, NativeGeometry,
    PlanarEngine, SphericalEngine, engine_for,
};
pub use observation::{NodeType, NodeTypeError, ObservationError, SatelliteObservation, Sensor};
pub use query::QueryParameter;
pub use time_axis::{TimeAxis, TimeInterval, TrackMetric};
