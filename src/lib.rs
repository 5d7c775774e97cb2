//! Facade crate for the satellite observation catalog.
//!
//! This crate re-exports the core domain types and the storage facade, with
//! the backend drivers behind feature flags.

#![forbid(unsafe_code)]

pub use satcat_core::{
    EngineKind, Geometry, GeometryEngine, GeometryError, NativeFormat, NativeGeometry, NodeType,
    ObservationError, PlanarEngine, QueryParameter, SatelliteObservation, Sensor,
    SphericalEngine, TimeAxis, TimeInterval, engine_for,
};
pub use satcat_store::{
    Catalog, CatalogError, CatalogState, ConfigError, ConnectionConfig, Driver, DriverError,
    DriverKind, registry, sql,
};

#[cfg(feature = "store-sqlite")]
pub use satcat_store::driver::EmbeddedDriver;

#[cfg(feature = "store-postgis")]
pub use satcat_store::driver::PostGisDriver;

#[cfg(feature = "store-mysql")]
pub use satcat_store::driver::MySqlDriver;

#[cfg(feature = "store-mongodb")]
pub use satcat_store::driver::MongoDriver;
