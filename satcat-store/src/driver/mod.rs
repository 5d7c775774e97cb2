//! Backend drivers.
//!
//! A [`Driver`] owns the connection pool of one backend and implements the
//! catalog's storage contract on top of it. Relational drivers share the SQL
//! text from [`crate::sql`] and the row assembly below; the document driver
//! translates the same criteria into a filter document.

#[cfg(feature = "store-sqlite")]
mod embedded;
#[cfg(feature = "store-mongodb")]
mod mongodb;
#[cfg(feature = "store-mysql")]
mod mysql;
#[cfg(feature = "store-postgis")]
mod postgis;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use satcat_core::{
    GeometryEngine, GeometryError, NativeFormat, NativeGeometry, NodeType, ObservationError,
    QueryParameter, SatelliteObservation, Sensor,
};
use thiserror::Error;

use crate::config::ConnectionConfig;

#[cfg(feature = "store-sqlite")]
pub use self::embedded::EmbeddedDriver;
#[cfg(feature = "store-mongodb")]
pub use self::mongodb::MongoDriver;
#[cfg(feature = "store-mysql")]
pub use self::mysql::MySqlDriver;
#[cfg(feature = "store-postgis")]
pub use self::postgis::PostGisDriver;

/// Family of a driver, deciding how criteria are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// SQL text built by [`crate::sql`].
    Relational,
    /// Filter documents with native geo operators.
    Document,
}

/// Errors raised by a backend driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The backend rejected an operation.
    #[error("{operation} failed: {source}")]
    Backend {
        /// What the driver was doing.
        operation: &'static str,
        /// Error returned by the backend client.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// A stored value could not be mapped back into the model.
    #[error("failed to decode column {column}: {reason}")]
    Decode {
        /// Column or field being read.
        column: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// The connection URL could not be used by this driver.
    #[error("invalid connection URL `{url}`: {reason}")]
    InvalidUrl {
        /// The rejected URL, without credentials.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A stored or supplied geometry was invalid.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// A stored observation violated the model invariants.
    #[error(transparent)]
    Observation(#[from] ObservationError),
    /// The driver was never opened or has been closed.
    #[error("driver connection is closed")]
    Closed,
}

impl DriverError {
    /// Wrap a backend client error with the operation that raised it.
    pub(crate) fn backend<E>(operation: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend {
            operation,
            source: Box::new(source),
        }
    }
}

/// Attach the failing operation to backend client errors.
pub(crate) trait BackendContext<T> {
    /// Map the error into [`DriverError::Backend`].
    fn backend(self, operation: &'static str) -> Result<T, DriverError>;
}

impl<T, E> BackendContext<T> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn backend(self, operation: &'static str) -> Result<T, DriverError> {
        self.map_err(|source| DriverError::backend(operation, source))
    }
}

/// Parse a stored timestamp literal, naming the column on failure.
pub(crate) fn decode_timestamp(
    column: &'static str,
    text: &str,
) -> Result<DateTime<Utc>, DriverError> {
    crate::sql::parse_timestamp(text).map_err(|err| DriverError::Decode {
        column,
        reason: format!("`{text}` is not a timestamp: {err}"),
    })
}

/// Drop a leading `jdbc:` (any case) so native clients accept the URL.
pub(crate) fn strip_jdbc_prefix(url: &str) -> &str {
    const PREFIX: &str = "jdbc:";
    url.get(..PREFIX.len())
        .filter(|head| head.eq_ignore_ascii_case(PREFIX))
        .and_then(|_| url.get(PREFIX.len()..))
        .unwrap_or(url)
}

/// Storage contract implemented once per backend.
///
/// Drivers are created unopened by the [`registry`](crate::registry); every
/// data operation before [`Driver::open`] or after [`Driver::close`] fails
/// with [`DriverError::Closed`].
pub trait Driver: Send + fmt::Debug {
    /// Scheme prefix this driver claims, e.g. `jdbc:h2`.
    fn url_pattern(&self) -> &'static str;

    /// Family of the driver.
    fn kind(&self) -> DriverKind;

    /// Connect using `config` and bind the geometry engine used to decode
    /// stored geometries.
    ///
    /// # Errors
    /// Returns [`DriverError::InvalidUrl`] or [`DriverError::Backend`] when
    /// the backend cannot be reached.
    fn open(
        &mut self,
        config: &ConnectionConfig,
        engine: Arc<dyn GeometryEngine>,
    ) -> Result<(), DriverError>;

    /// Whether the storage structures exist in the backend.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`] or a backend failure.
    fn is_initialized(&self) -> Result<bool, DriverError>;

    /// Create the storage structures if they are absent.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`] or a backend failure.
    fn initialize_schema(&self) -> Result<(), DriverError>;

    /// Store `sensor` unless one with the same name exists, returning the
    /// backend id. Backends that embed sensors in observations return `None`.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`] or a backend failure.
    fn insert_sensor(&self, sensor: &Sensor) -> Result<Option<i64>, DriverError>;

    /// Store an observation with its footprint and time axes, registering
    /// its sensor when needed.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`] or a backend failure.
    fn insert_observation(&self, observation: &SatelliteObservation) -> Result<(), DriverError>;

    /// Observations matching `parameter`, ordered by id. `None` selects all.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`], a backend failure, or a decode error
    /// for rows that no longer fit the model.
    fn query(
        &self,
        parameter: Option<&QueryParameter>,
    ) -> Result<Vec<SatelliteObservation>, DriverError>;

    /// Every stored observation, ordered by id.
    ///
    /// # Errors
    /// As for [`Driver::query`].
    fn query_all(&self) -> Result<Vec<SatelliteObservation>, DriverError> {
        self.query(None)
    }

    /// Whether an observation with exactly the sensor name and path of
    /// `parameter` exists. Other criteria are ignored.
    ///
    /// # Errors
    /// As for [`Driver::query`].
    fn exists_by_unique_key(&self, parameter: &QueryParameter) -> Result<bool, DriverError> {
        let Some(key) = unique_key_query(parameter) else {
            return Ok(false);
        };
        Ok(!self.query(Some(&key))?.is_empty())
    }

    /// Drop every storage structure and its content.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`] or a backend failure.
    fn clear_all(&self) -> Result<(), DriverError>;

    /// Release pooled connections. Repeated calls do nothing.
    fn close(&mut self);
}

/// Single-row lookup on sensor name and path, or `None` when either is unset.
pub(crate) fn unique_key_query(parameter: &QueryParameter) -> Option<QueryParameter> {
    if parameter.sensor_name().is_none() || parameter.path().is_none() {
        return None;
    }
    Some(parameter.unique_key().with_page_size(1))
}

/// Log when a geometry criterion cannot be expressed by a SQL backend.
pub(crate) fn warn_ignored_geometry(parameter: Option<&QueryParameter>, backend: &str) {
    if parameter.is_some_and(|criteria| criteria.geometry.is_some()) {
        warn!("{backend} cannot filter on geometry; the criterion is ignored");
    }
}

/// Render a footprint or track as WKT for `ST_GeomFromText` style storage.
pub(crate) fn to_wkt(engine: &dyn GeometryEngine, geometry: &satcat_core::Geometry) -> String {
    match engine.to_native(geometry, NativeFormat::Wkt) {
        NativeGeometry::Wkt(text) => text,
        NativeGeometry::GeoJson(_) => engine.format(geometry),
    }
}

/// Time axis columns of a joined row.
#[derive(Debug, Clone)]
pub(crate) struct AxisRow {
    pub(crate) track: String,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) stop_time: DateTime<Utc>,
}

/// One row of the joined observation query, with geometries as WKT.
#[derive(Debug, Clone)]
pub(crate) struct ObservationRow {
    pub(crate) id: i64,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) stop_time: DateTime<Utc>,
    pub(crate) node_type: i32,
    pub(crate) geo_bounds: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) data_file: String,
    pub(crate) sensor_id: Option<i64>,
    pub(crate) sensor_name: String,
    pub(crate) axis: Option<AxisRow>,
}

/// Fold rows ordered by observation id into observations, attaching every
/// time axis row to its observation.
pub(crate) fn assemble(
    rows: Vec<ObservationRow>,
    engine: &dyn GeometryEngine,
) -> Result<Vec<SatelliteObservation>, DriverError> {
    let mut assembled: Vec<(i64, SatelliteObservation)> = Vec::new();
    for mut row in rows {
        let axis = row.axis.take();
        if assembled.last().is_none_or(|(id, _)| *id != row.id) {
            let id = row.id;
            assembled.push((id, observation_from_row(row, engine)?));
        }
        if let Some(axis_row) = axis
            && let Some((_, current)) = assembled.last_mut()
        {
            let track = engine.parse(&axis_row.track)?.into_line_string()?;
            current.time_axes.push(engine.create_time_axis(
                track,
                axis_row.start_time,
                axis_row.stop_time,
            )?);
        }
    }
    Ok(assembled
        .into_iter()
        .map(|(_, observation)| observation)
        .collect())
}

fn observation_from_row(
    row: ObservationRow,
    engine: &dyn GeometryEngine,
) -> Result<SatelliteObservation, DriverError> {
    let node_type = NodeType::from_id(row.node_type).map_err(|err| DriverError::Decode {
        column: "NodeType",
        reason: err.to_string(),
    })?;
    let sensor = Sensor {
        id: row.sensor_id,
        name: row.sensor_name,
    };
    let mut observation =
        SatelliteObservation::new(sensor, row.data_file, row.start_time, row.stop_time)?
            .with_node_type(node_type)
            .with_version(row.version.unwrap_or_default());
    if let Some(text) = row.geo_bounds {
        observation.geo_bounds = Some(engine.from_native(&NativeGeometry::Wkt(text))?);
    }
    Ok(observation)
}

#[cfg(test)]
mod tests;
