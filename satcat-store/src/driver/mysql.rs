//! MySQL driver for `jdbc:mysql` URLs.
//!
//! Observations are selected with the un-joined builder; sensor names and
//! time axes are fetched with follow-up lookups per observation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use mysql::prelude::Queryable;
use mysql::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, PooledConn, TxOpts};
use satcat_core::{Geometry, GeometryEngine, QueryParameter, SatelliteObservation, Sensor};

use super::{
    AxisRow, BackendContext, Driver, DriverError, DriverKind, ObservationRow, assemble,
    decode_timestamp, strip_jdbc_prefix, to_wkt, warn_ignored_geometry,
};
use crate::config::ConnectionConfig;
use crate::sql::{create_observation_sql_with_projection, format_timestamp};

const URL_PATTERN: &str = "jdbc:mysql";

/// Reads back timestamps in the layout [`decode_timestamp`] accepts.
const PROJECTION: &str = "ID, DATE_FORMAT(StartDate, '%Y-%m-%d %H:%i:%s.%f'), \
     DATE_FORMAT(StopDate, '%Y-%m-%d %H:%i:%s.%f'), NodeType, ST_AsText(GeoBounds), \
     SensorId, Version, DataFile";

const AXES_OF_OBSERVATION: &str = "SELECT ST_AsText(Axis), \
     DATE_FORMAT(StartTime, '%Y-%m-%d %H:%i:%s.%f'), \
     DATE_FORMAT(StopTime, '%Y-%m-%d %H:%i:%s.%f') \
     FROM TIMEAXIS WHERE ObservationId = ? ORDER BY ID";

const CREATE_SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS SENSOR (
        ID INT AUTO_INCREMENT PRIMARY KEY,
        Name VARCHAR(64) NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS SATELLITE_OBSERVATION (
        ID INT AUTO_INCREMENT PRIMARY KEY,
        StartDate DATETIME(6) NOT NULL,
        StopDate DATETIME(6) NOT NULL,
        NodeType TINYINT NOT NULL,
        GeoBounds GEOMETRY,
        SensorId INT NOT NULL,
        Version VARCHAR(16),
        DataFile VARCHAR(256) NOT NULL,
        FOREIGN KEY (SensorId) REFERENCES SENSOR(ID)
    )",
    "CREATE TABLE IF NOT EXISTS TIMEAXIS (
        ID INT AUTO_INCREMENT PRIMARY KEY,
        ObservationId INT NOT NULL,
        Axis GEOMETRY NOT NULL,
        StartTime DATETIME(6) NOT NULL,
        StopTime DATETIME(6) NOT NULL,
        FOREIGN KEY (ObservationId) REFERENCES SATELLITE_OBSERVATION(ID)
    )",
];

const DROP_SCHEMA: [&str; 3] = [
    "DROP TABLE IF EXISTS TIMEAXIS",
    "DROP TABLE IF EXISTS SATELLITE_OBSERVATION",
    "DROP TABLE IF EXISTS SENSOR",
];

const COUNT_TABLES: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = DATABASE() \
     AND table_name IN ('SATELLITE_OBSERVATION', 'SENSOR', 'TIMEAXIS')";

type LeanRow = (
    i64,
    String,
    String,
    i32,
    Option<String>,
    i64,
    Option<String>,
    String,
);

struct Connected {
    pool: Pool,
    engine: Arc<dyn GeometryEngine>,
}

/// MySQL driver registered for the `jdbc:mysql` scheme.
#[derive(Default)]
pub struct MySqlDriver {
    connected: Option<Connected>,
}

impl fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("open", &self.connected.is_some())
            .finish_non_exhaustive()
    }
}

impl MySqlDriver {
    /// An unopened driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connected(&self) -> Result<&Connected, DriverError> {
        self.connected.as_ref().ok_or(DriverError::Closed)
    }

    fn connection(&self) -> Result<PooledConn, DriverError> {
        self.connected()?.pool.get_conn().backend("acquire connection")
    }
}

/// Client options for `config`: the URL without `jdbc:`, with the
/// descriptor's credentials, timeout and pool size applied.
fn client_opts(config: &ConnectionConfig) -> Result<OptsBuilder, DriverError> {
    let url = strip_jdbc_prefix(config.url.trim());
    let parsed = Opts::from_url(url).map_err(|_| DriverError::InvalidUrl {
        url: url.to_owned(),
        reason: "not a MySQL connection URL",
    })?;
    let max = usize::try_from(config.max_connections).unwrap_or(usize::MAX);
    let constraints = PoolConstraints::new(1, max).unwrap_or_default();
    let mut builder = OptsBuilder::from_opts(parsed)
        .tcp_connect_timeout(Some(config.timeout()))
        .pool_opts(PoolOpts::default().with_constraints(constraints));
    if let Some((user, password)) = config.credentials() {
        builder = builder.user(Some(user)).pass(Some(password));
    }
    Ok(builder)
}

impl Driver for MySqlDriver {
    fn url_pattern(&self) -> &'static str {
        URL_PATTERN
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Relational
    }

    fn open(
        &mut self,
        config: &ConnectionConfig,
        engine: Arc<dyn GeometryEngine>,
    ) -> Result<(), DriverError> {
        let pool = Pool::new(client_opts(config)?).backend("open connection pool")?;
        info!("opened MySQL catalog at {}", strip_jdbc_prefix(&config.url));
        self.connected = Some(Connected { pool, engine });
        Ok(())
    }

    fn is_initialized(&self) -> Result<bool, DriverError> {
        let count: Option<i64> = self
            .connection()?
            .query_first(COUNT_TABLES)
            .backend("inspect schema")?;
        Ok(count == Some(3))
    }

    fn initialize_schema(&self) -> Result<(), DriverError> {
        let mut connection = self.connection()?;
        for statement in CREATE_SCHEMA {
            connection.query_drop(statement).backend("create schema")?;
        }
        Ok(())
    }

    fn insert_sensor(&self, sensor: &Sensor) -> Result<Option<i64>, DriverError> {
        let mut connection = self.connection()?;
        resolve_sensor(&mut connection, &sensor.name).map(Some)
    }

    fn insert_observation(&self, observation: &SatelliteObservation) -> Result<(), DriverError> {
        let engine = Arc::clone(&self.connected()?.engine);
        let mut connection = self.connection()?;
        let mut transaction = connection
            .start_transaction(TxOpts::default())
            .backend("begin transaction")?;
        let sensor_id = resolve_sensor(&mut transaction, &observation.sensor.name)?;
        let bounds = observation
            .geo_bounds
            .as_ref()
            .map(|geometry| to_wkt(engine.as_ref(), geometry));
        transaction
            .exec_drop(
                "INSERT INTO SATELLITE_OBSERVATION \
                 (StartDate, StopDate, NodeType, GeoBounds, SensorId, Version, DataFile) \
                 VALUES (?, ?, ?, ST_GeomFromText(?), ?, ?, ?)",
                (
                    format_timestamp(observation.start_time),
                    format_timestamp(observation.stop_time),
                    observation.node_type.to_id(),
                    bounds,
                    sensor_id,
                    observation.version.as_str(),
                    observation.data_file_path.as_str(),
                ),
            )
            .backend("insert observation")?;
        let observation_id = last_insert_id(&mut transaction)?;
        for axis in &observation.time_axes {
            let track = to_wkt(engine.as_ref(), &Geometry::LineString(axis.geometry().clone()));
            transaction
                .exec_drop(
                    "INSERT INTO TIMEAXIS (ObservationId, Axis, StartTime, StopTime) \
                     VALUES (?, ST_GeomFromText(?), ?, ?)",
                    (
                        observation_id,
                        track,
                        format_timestamp(axis.start_time()),
                        format_timestamp(axis.end_time()),
                    ),
                )
                .backend("insert time axis")?;
        }
        transaction.commit().backend("commit observation")
    }

    fn query(
        &self,
        parameter: Option<&QueryParameter>,
    ) -> Result<Vec<SatelliteObservation>, DriverError> {
        warn_ignored_geometry(parameter, "MySQL driver");
        let engine = Arc::clone(&self.connected()?.engine);
        let mut connection = self.connection()?;
        let sql = create_observation_sql_with_projection(PROJECTION, parameter);
        debug!("MySQL query: {sql}");
        let observations: Vec<LeanRow> = connection.query(sql).backend("run query")?;
        let mut sensor_names: HashMap<i64, String> = HashMap::new();
        let mut rows = Vec::with_capacity(observations.len());
        for lean in observations {
            let (id, _, _, _, _, sensor_id, _, _) = lean;
            if !sensor_names.contains_key(&sensor_id) {
                let name = sensor_name(&mut connection, sensor_id)?;
                sensor_names.insert(sensor_id, name);
            }
            let name = sensor_names.get(&sensor_id).cloned().unwrap_or_default();
            let axes = axes_of(&mut connection, id)?;
            rows.extend(expand_row(lean, name, axes)?);
        }
        assemble(rows, engine.as_ref())
    }

    fn clear_all(&self) -> Result<(), DriverError> {
        let mut connection = self.connection()?;
        for statement in DROP_SCHEMA {
            connection.query_drop(statement).backend("drop schema")?;
        }
        info!("dropped MySQL catalog tables");
        Ok(())
    }

    fn close(&mut self) {
        if self.connected.take().is_some() {
            debug!("closed MySQL catalog pool");
        }
    }
}

fn last_insert_id<Q: Queryable>(client: &mut Q) -> Result<i64, DriverError> {
    client
        .query_first::<i64, _>("SELECT LAST_INSERT_ID()")
        .backend("read inserted id")?
        .ok_or(DriverError::Decode {
            column: "ID",
            reason: String::from("no id was generated"),
        })
}

/// Id of the sensor called `name`, inserting it when absent.
fn resolve_sensor<Q: Queryable>(client: &mut Q, name: &str) -> Result<i64, DriverError> {
    let existing: Option<i64> = client
        .exec_first("SELECT ID FROM SENSOR WHERE Name = ?", (name,))
        .backend("look up sensor")?;
    if let Some(id) = existing {
        debug!("reusing sensor {name} with id {id}");
        return Ok(id);
    }
    client
        .exec_drop("INSERT INTO SENSOR (Name) VALUES (?)", (name,))
        .backend("insert sensor")?;
    last_insert_id(client)
}

fn sensor_name(connection: &mut PooledConn, sensor_id: i64) -> Result<String, DriverError> {
    let name: Option<String> = connection
        .exec_first("SELECT Name FROM SENSOR WHERE ID = ?", (sensor_id,))
        .backend("look up sensor name")?;
    name.ok_or_else(|| DriverError::Decode {
        column: "SensorId",
        reason: format!("sensor {sensor_id} does not exist"),
    })
}

fn axes_of(connection: &mut PooledConn, observation_id: i64) -> Result<Vec<AxisRow>, DriverError> {
    let raw: Vec<(String, String, String)> = connection
        .exec(AXES_OF_OBSERVATION, (observation_id,))
        .backend("load time axes")?;
    raw.into_iter()
        .map(|(track, start, stop)| {
            Ok(AxisRow {
                track,
                start_time: decode_timestamp("StartTime", &start)?,
                stop_time: decode_timestamp("StopTime", &stop)?,
            })
        })
        .collect()
}

/// One [`ObservationRow`] per time axis, or a single axis-less row.
fn expand_row(
    lean: LeanRow,
    sensor_name: String,
    axes: Vec<AxisRow>,
) -> Result<Vec<ObservationRow>, DriverError> {
    let (id, start, stop, node_type, geo_bounds, sensor_id, version, data_file) = lean;
    let base = ObservationRow {
        id,
        start_time: decode_timestamp("StartDate", &start)?,
        stop_time: decode_timestamp("StopDate", &stop)?,
        node_type,
        geo_bounds,
        version,
        data_file,
        sensor_id: Some(sensor_id),
        sensor_name,
        axis: None,
    };
    if axes.is_empty() {
        return Ok(vec![base]);
    }
    Ok(axes
        .into_iter()
        .map(|axis| ObservationRow {
            axis: Some(axis),
            ..base.clone()
        })
        .collect())
}
