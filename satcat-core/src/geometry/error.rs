//! Errors raised by the geometry adapter.

use thiserror::Error;

/// Errors produced while parsing, converting or measuring geometries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// The WKT text could not be parsed.
    #[error("failed to parse geometry `{wkt}`: {reason}")]
    Parse {
        /// The offending text.
        wkt: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The geometry type has no counterpart in the catalog model.
    #[error("unsupported geometry type {kind}")]
    UnsupportedGeometry {
        /// Name of the rejected type, e.g. `MultiPoint`.
        kind: &'static str,
    },
    /// A GeoJSON document did not describe a supported geometry.
    #[error("invalid GeoJSON geometry: {reason}")]
    InvalidGeoJson {
        /// What was wrong with the document.
        reason: String,
    },
    /// A time axis could not be built from the supplied track.
    #[error("invalid time axis: {reason}")]
    InvalidTimeAxis {
        /// Why the track was rejected.
        reason: &'static str,
    },
}
