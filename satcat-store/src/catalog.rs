//! The catalog facade.
//!
//! A [`Catalog`] owns one opened [`Driver`] and the [`GeometryEngine`] bound
//! at creation. It tracks a small lifecycle so that data operations on a
//! cleared or closed catalog fail loudly instead of returning empty results:
//!
//! ```text
//! Created --initialize--> Initialized --clear--> Uninitialized --close--> Closed
//!    ^                                               |
//!    +--------------------- initialize --------------+ (to Initialized)
//! ```
//!
//! `close` is accepted from every state and repeated calls do nothing. In
//! `Created`, data operations are served only when the backend already holds
//! the schema, for example one set up by another process.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//!
//! use satcat_core::{PlanarEngine, QueryParameter};
//! use satcat_store::{Catalog, ConnectionConfig};
//!
//! # fn main() -> Result<(), satcat_store::CatalogError> {
//! let config = ConnectionConfig::new("jdbc:h2:mem:doc");
//! let mut catalog = Catalog::create(&config, Arc::new(PlanarEngine))?;
//! catalog.initialize()?;
//! assert!(catalog.get()?.is_empty());
//!
//! let key = QueryParameter::default()
//!     .with_sensor_name("amsub-n15")
//!     .with_path("/archive/one.nc");
//! assert!(!catalog.is_already_registered(&key)?);
//! catalog.close();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::{debug, info, warn};
use satcat_core::{GeometryEngine, QueryParameter, SatelliteObservation, Sensor};
use thiserror::Error;

use crate::config::{ConfigError, ConnectionConfig};
use crate::driver::{Driver, DriverError};
use crate::registry;

/// Errors raised by [`Catalog`] operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No driver claims the URL's scheme.
    #[error("no catalog driver is registered for `{url}`; known schemes: {known}")]
    UnknownScheme {
        /// The URL that failed to resolve.
        url: String,
        /// Comma-separated scheme prefixes the registry recognises.
        known: String,
    },
    /// The driver claiming the scheme was compiled out.
    #[error("the `{scheme}` driver is not available; enable the `{feature}` feature")]
    DriverUnavailable {
        /// Matched scheme prefix.
        scheme: &'static str,
        /// Cargo feature providing the driver.
        feature: &'static str,
    },
    /// The catalog was cleared and has not been initialised again.
    #[error("catalog is not initialized")]
    NotInitialized,
    /// The catalog was closed.
    #[error("catalog is closed")]
    Closed,
    /// The connection descriptor was unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The backend failed.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Lifecycle position of a [`Catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogState {
    /// Connected; the schema may or may not exist yet.
    Created,
    /// The schema was created by this catalog.
    Initialized,
    /// The schema was dropped by [`Catalog::clear`].
    Uninitialized,
    /// Connections were released.
    Closed,
}

/// Storage facade over one backend driver.
#[derive(Debug)]
pub struct Catalog {
    driver: Box<dyn Driver>,
    engine: Arc<dyn GeometryEngine>,
    state: CatalogState,
}

impl Catalog {
    /// Validate `config`, resolve its driver and connect.
    ///
    /// # Errors
    /// Returns [`CatalogError::Config`] for an unusable descriptor,
    /// [`CatalogError::UnknownScheme`] or [`CatalogError::DriverUnavailable`]
    /// when no driver can serve the URL, and [`CatalogError::Driver`] when
    /// the connection cannot be opened.
    pub fn create(
        config: &ConnectionConfig,
        engine: Arc<dyn GeometryEngine>,
    ) -> Result<Self, CatalogError> {
        config.validate()?;
        let mut driver = registry::resolve(&config.url)?;
        driver.open(config, Arc::clone(&engine))?;
        info!(
            "catalog created with {} driver and {} geometry engine",
            driver.url_pattern(),
            engine.kind()
        );
        Ok(Self {
            driver,
            engine,
            state: CatalogState::Created,
        })
    }

    /// Create the storage structures when absent.
    ///
    /// # Errors
    /// Returns [`CatalogError::Closed`] after [`Self::close`], or the
    /// driver's failure.
    pub fn initialize(&mut self) -> Result<(), CatalogError> {
        if self.state == CatalogState::Closed {
            return Err(CatalogError::Closed);
        }
        self.driver.initialize_schema()?;
        self.state = CatalogState::Initialized;
        info!("catalog schema initialised");
        Ok(())
    }

    /// Register `sensor`, returning its backend id when the backend keeps
    /// sensors separately.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotInitialized`] when no schema exists,
    /// [`CatalogError::Closed`] or the driver's failure.
    pub fn insert_sensor(&self, sensor: &Sensor) -> Result<Option<i64>, CatalogError> {
        self.ensure_usable()?;
        Ok(self.driver.insert_sensor(sensor)?)
    }

    /// Store `observation` with its footprint and time axes.
    ///
    /// Duplicates are not detected; check [`Self::is_already_registered`]
    /// first.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotInitialized`], [`CatalogError::Closed`] or
    /// the driver's failure.
    pub fn insert_observation(
        &self,
        observation: &SatelliteObservation,
    ) -> Result<(), CatalogError> {
        self.ensure_usable()?;
        self.driver.insert_observation(observation)?;
        debug!(
            "stored {} observation {}",
            observation.sensor.name, observation.data_file_path
        );
        Ok(())
    }

    /// Every stored observation, ordered by id.
    ///
    /// # Errors
    /// As for [`Self::get_with`].
    pub fn get(&self) -> Result<Vec<SatelliteObservation>, CatalogError> {
        self.ensure_usable()?;
        Ok(self.driver.query_all()?)
    }

    /// Observations matching `parameter`, ordered by id.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotInitialized`], [`CatalogError::Closed`] or
    /// the driver's failure.
    pub fn get_with(
        &self,
        parameter: &QueryParameter,
    ) -> Result<Vec<SatelliteObservation>, CatalogError> {
        self.ensure_usable()?;
        Ok(self.driver.query(Some(parameter))?)
    }

    /// Whether an observation with the sensor name and path of `parameter`
    /// is stored. Other criteria are ignored.
    ///
    /// # Errors
    /// As for [`Self::get_with`].
    pub fn is_already_registered(&self, parameter: &QueryParameter) -> Result<bool, CatalogError> {
        self.ensure_usable()?;
        Ok(self.driver.exists_by_unique_key(parameter)?)
    }

    /// Whether [`Self::initialize`] succeeded with no later clear or close.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state == CatalogState::Initialized
    }

    /// Drop all stored data together with the storage structures.
    ///
    /// # Errors
    /// Returns [`CatalogError::Closed`] after [`Self::close`], or the
    /// driver's failure.
    pub fn clear(&mut self) -> Result<(), CatalogError> {
        if self.state == CatalogState::Closed {
            return Err(CatalogError::Closed);
        }
        self.driver.clear_all()?;
        self.state = CatalogState::Uninitialized;
        warn!("catalog cleared; all observations were dropped");
        Ok(())
    }

    /// Release the driver's connections. Repeated calls do nothing.
    pub fn close(&mut self) {
        if self.state == CatalogState::Closed {
            return;
        }
        self.driver.close();
        self.state = CatalogState::Closed;
        info!("catalog closed");
    }

    /// Current lifecycle position.
    #[must_use]
    pub const fn state(&self) -> CatalogState {
        self.state
    }

    /// The engine stored geometries are decoded with. Parse query geometries
    /// with it too.
    #[must_use]
    pub fn geometry_engine(&self) -> Arc<dyn GeometryEngine> {
        Arc::clone(&self.engine)
    }

    fn ensure_usable(&self) -> Result<(), CatalogError> {
        match self.state {
            CatalogState::Initialized => Ok(()),
            CatalogState::Created if self.driver.is_initialized()? => Ok(()),
            CatalogState::Created | CatalogState::Uninitialized => {
                Err(CatalogError::NotInitialized)
            }
            CatalogState::Closed => Err(CatalogError::Closed),
        }
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(all(test, feature = "store-sqlite"))]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use satcat_core::PlanarEngine;
    use satcat_core::test_support::{millis, sample_observation};
    use tempfile::TempDir;

    #[fixture]
    fn catalog() -> Catalog {
        Catalog::create(
            &ConnectionConfig::new("jdbc:h2:mem:catalog-unit"),
            Arc::new(PlanarEngine),
        )
        .expect("in-memory catalog")
    }

    #[rstest]
    fn starts_created(catalog: Catalog) {
        assert_eq!(catalog.state(), CatalogState::Created);
        assert!(!catalog.is_initialized());
    }

    #[rstest]
    fn initialise_is_idempotent(mut catalog: Catalog) {
        catalog.initialize().expect("schema");
        catalog.initialize().expect("initialise again");
        assert!(catalog.get().expect("query").is_empty());
    }

    #[rstest]
    fn created_catalog_without_schema_rejects_data_operations(catalog: Catalog) {
        assert!(matches!(catalog.get(), Err(CatalogError::NotInitialized)));
        let key = QueryParameter::default()
            .with_sensor_name("amsub-n15")
            .with_path("/archive/one.nc");
        assert!(matches!(
            catalog.is_already_registered(&key),
            Err(CatalogError::NotInitialized)
        ));
    }

    #[rstest]
    fn created_catalog_serves_schema_set_up_elsewhere() {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("jdbc:h2:{}", dir.path().join("shared.db").display());
        let config = ConnectionConfig::new(url);
        let observation = sample_observation(
            &PlanarEngine,
            "amsub-n15",
            "/archive/shared.nc",
            millis(1_000),
            millis(2_000),
        )
        .expect("sample");

        let mut writer = Catalog::create(&config, Arc::new(PlanarEngine)).expect("writer");
        writer.initialize().expect("schema");
        writer.insert_observation(&observation).expect("insert");
        writer.close();

        let reader = Catalog::create(&config, Arc::new(PlanarEngine)).expect("reader");
        assert_eq!(reader.state(), CatalogState::Created);
        assert!(!reader.is_initialized());
        assert_eq!(reader.get().expect("query").len(), 1);
    }

    #[rstest]
    fn cleared_catalog_rejects_data_operations(mut catalog: Catalog) {
        catalog.initialize().expect("schema");
        catalog.clear().expect("clear");
        assert!(!catalog.is_initialized());
        assert!(matches!(catalog.get(), Err(CatalogError::NotInitialized)));
        assert!(matches!(
            catalog.insert_sensor(&Sensor::new("mhs-n18")),
            Err(CatalogError::NotInitialized)
        ));
        catalog.initialize().expect("schema can be recreated");
        assert!(catalog.get().expect("query").is_empty());
    }

    #[rstest]
    fn closed_catalog_rejects_everything(mut catalog: Catalog) {
        catalog.close();
        catalog.close();
        assert_eq!(catalog.state(), CatalogState::Closed);
        assert!(matches!(catalog.get(), Err(CatalogError::Closed)));
        assert!(matches!(catalog.initialize(), Err(CatalogError::Closed)));
        assert!(matches!(catalog.clear(), Err(CatalogError::Closed)));
    }

    #[rstest]
    fn unknown_scheme_fails_fast() {
        let err = Catalog::create(
            &ConnectionConfig::new("jdbc:oracle:thin:@db"),
            Arc::new(PlanarEngine),
        )
        .expect_err("no oracle driver");
        assert!(matches!(err, CatalogError::UnknownScheme { .. }));
        assert!(err.to_string().ends_with(
            "known schemes: jdbc:h2, jdbc:mysql, jdbc:postgresql, mongodb"
        ));
    }

    #[rstest]
    fn invalid_descriptor_fails_before_resolution() {
        let err = Catalog::create(
            &ConnectionConfig::new("jdbc:h2:mem:x").with_timeout_secs(0),
            Arc::new(PlanarEngine),
        )
        .expect_err("zero timeout");
        assert!(matches!(err, CatalogError::Config(ConfigError::ZeroTimeout)));
    }
}
