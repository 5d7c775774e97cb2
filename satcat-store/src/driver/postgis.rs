//! PostGIS driver for `jdbc:postgresql` URLs.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{debug, info};
use postgres::types::FromSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use satcat_core::{Geometry, GeometryEngine, QueryParameter, SatelliteObservation, Sensor};

use super::{
    AxisRow, BackendContext, Driver, DriverError, DriverKind, ObservationRow, assemble,
    strip_jdbc_prefix, to_wkt, warn_ignored_geometry,
};
use crate::config::ConnectionConfig;
use crate::sql::create_paged_sql_with_projection;

const URL_PATTERN: &str = "jdbc:postgresql";

/// Columns read by [`read_row`], in index order. Geometries come back as WKT.
const PROJECTION: &str = "obs.ID, obs.StartDate, obs.StopDate, obs.NodeType, \
     ST_AsText(obs.GeoBounds), obs.SensorId, obs.Version, obs.DataFile, sen.Name, \
     ST_AsText(axis.Axis), axis.StartTime, axis.StopTime";

const CREATE_SCHEMA: &str = "\
CREATE EXTENSION IF NOT EXISTS postgis;
CREATE TABLE IF NOT EXISTS SENSOR (
    ID SERIAL PRIMARY KEY,
    Name VARCHAR(64) NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS SATELLITE_OBSERVATION (
    ID SERIAL PRIMARY KEY,
    StartDate TIMESTAMP NOT NULL,
    StopDate TIMESTAMP NOT NULL,
    NodeType INTEGER NOT NULL,
    GeoBounds GEOMETRY,
    SensorId INTEGER NOT NULL REFERENCES SENSOR(ID),
    Version VARCHAR(16),
    DataFile VARCHAR(256) NOT NULL
);
CREATE TABLE IF NOT EXISTS TIMEAXIS (
    ID SERIAL PRIMARY KEY,
    ObservationId INTEGER NOT NULL REFERENCES SATELLITE_OBSERVATION(ID),
    Axis GEOMETRY NOT NULL,
    StartTime TIMESTAMP NOT NULL,
    StopTime TIMESTAMP NOT NULL
);";

const DROP_SCHEMA: &str = "\
DROP TABLE IF EXISTS TIMEAXIS;
DROP TABLE IF EXISTS SATELLITE_OBSERVATION;
DROP TABLE IF EXISTS SENSOR;";

const COUNT_TABLES: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = current_schema() \
     AND table_name IN ('satellite_observation', 'sensor', 'timeaxis')";

type Manager = PostgresConnectionManager<NoTls>;

struct Connected {
    pool: Pool<Manager>,
    engine: Arc<dyn GeometryEngine>,
}

/// PostgreSQL/PostGIS driver registered for the `jdbc:postgresql` scheme.
#[derive(Default)]
pub struct PostGisDriver {
    connected: Option<Connected>,
}

impl fmt::Debug for PostGisDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostGisDriver")
            .field("open", &self.connected.is_some())
            .finish_non_exhaustive()
    }
}

impl PostGisDriver {
    /// An unopened driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connected(&self) -> Result<&Connected, DriverError> {
        self.connected.as_ref().ok_or(DriverError::Closed)
    }

    fn connection(&self) -> Result<PooledConnection<Manager>, DriverError> {
        self.connected()?.pool.get().backend("acquire connection")
    }
}

/// Client settings for `config`: the URL without `jdbc:`, overridden by the
/// descriptor's credentials and timeout.
fn client_config(config: &ConnectionConfig) -> Result<postgres::Config, DriverError> {
    let url = strip_jdbc_prefix(config.url.trim());
    let mut client = url
        .parse::<postgres::Config>()
        .map_err(|_| DriverError::InvalidUrl {
            url: url.to_owned(),
            reason: "not a PostgreSQL connection URL",
        })?;
    if let Some((user, password)) = config.credentials() {
        client.user(user).password(password);
    }
    client.connect_timeout(config.timeout());
    Ok(client)
}

impl Driver for PostGisDriver {
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
        let manager = PostgresConnectionManager::new(client_config(config)?, NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(config.timeout())
            .idle_timeout(Some(config.timeout()))
            .build(manager)
            .backend("open connection pool")?;
        info!("opened PostGIS catalog at {}", strip_jdbc_prefix(&config.url));
        self.connected = Some(Connected { pool, engine });
        Ok(())
    }

    fn is_initialized(&self) -> Result<bool, DriverError> {
        let row = self
            .connection()?
            .query_one(COUNT_TABLES, &[])
            .backend("inspect schema")?;
        let count: i64 = row.try_get(0).backend("read table count")?;
        Ok(count == 3)
    }

    fn initialize_schema(&self) -> Result<(), DriverError> {
        self.connection()?
            .batch_execute(CREATE_SCHEMA)
            .backend("create schema")
    }

    fn insert_sensor(&self, sensor: &Sensor) -> Result<Option<i64>, DriverError> {
        let mut connection = self.connection()?;
        resolve_sensor(&mut *connection, &sensor.name).map(|id| Some(i64::from(id)))
    }

    fn insert_observation(&self, observation: &SatelliteObservation) -> Result<(), DriverError> {
        let engine = Arc::clone(&self.connected()?.engine);
        let mut connection = self.connection()?;
        let mut transaction = connection.transaction().backend("begin transaction")?;
        let sensor_id = resolve_sensor(&mut transaction, &observation.sensor.name)?;
        let bounds = observation
            .geo_bounds
            .as_ref()
            .map(|geometry| to_wkt(engine.as_ref(), geometry));
        let inserted = transaction
            .query_one(
                "INSERT INTO SATELLITE_OBSERVATION \
                 (StartDate, StopDate, NodeType, GeoBounds, SensorId, Version, DataFile) \
                 VALUES ($1, $2, $3, ST_GeomFromText($4), $5, $6, $7) RETURNING ID",
                &[
                    &observation.start_time.naive_utc(),
                    &observation.stop_time.naive_utc(),
                    &observation.node_type.to_id(),
                    &bounds,
                    &sensor_id,
                    &observation.version,
                    &observation.data_file_path,
                ],
            )
            .backend("insert observation")?;
        let observation_id: i32 = inserted.try_get(0).backend("read observation id")?;
        for axis in &observation.time_axes {
            let track = to_wkt(engine.as_ref(), &Geometry::LineString(axis.geometry().clone()));
            transaction
                .execute(
                    "INSERT INTO TIMEAXIS (ObservationId, Axis, StartTime, StopTime) \
                     VALUES ($1, ST_GeomFromText($2), $3, $4)",
                    &[
                        &observation_id,
                        &track,
                        &axis.start_time().naive_utc(),
                        &axis.end_time().naive_utc(),
                    ],
                )
                .backend("insert time axis")?;
        }
        transaction.commit().backend("commit observation")
    }

    fn query(
        &self,
        parameter: Option<&QueryParameter>,
    ) -> Result<Vec<SatelliteObservation>, DriverError> {
        warn_ignored_geometry(parameter, "PostGIS driver");
        let engine = Arc::clone(&self.connected()?.engine);
        let sql = create_paged_sql_with_projection(PROJECTION, parameter);
        debug!("PostGIS query: {sql}");
        let rows = self
            .connection()?
            .query(sql.as_str(), &[])
            .backend("run query")?;
        let decoded = rows
            .iter()
            .map(read_row)
            .collect::<Result<Vec<_>, _>>()?;
        assemble(decoded, engine.as_ref())
    }

    fn clear_all(&self) -> Result<(), DriverError> {
        self.connection()?
            .batch_execute(DROP_SCHEMA)
            .backend("drop schema")?;
        info!("dropped PostGIS catalog tables");
        Ok(())
    }

    fn close(&mut self) {
        if self.connected.take().is_some() {
            debug!("closed PostGIS catalog pool");
        }
    }
}

/// Id of the sensor called `name`, inserting it when absent.
fn resolve_sensor<C>(client: &mut C, name: &str) -> Result<i32, DriverError>
where
    C: postgres::GenericClient,
{
    let existing = client
        .query_opt("SELECT ID FROM SENSOR WHERE Name = $1", &[&name])
        .backend("look up sensor")?;
    if let Some(row) = existing {
        let id: i32 = row.try_get(0).backend("read sensor id")?;
        debug!("reusing sensor {name} with id {id}");
        return Ok(id);
    }
    let inserted = client
        .query_one("INSERT INTO SENSOR (Name) VALUES ($1) RETURNING ID", &[&name])
        .backend("insert sensor")?;
    inserted.try_get(0).backend("read sensor id")
}

fn column<'a, T: FromSql<'a>>(
    row: &'a Row,
    index: usize,
    name: &'static str,
) -> Result<T, DriverError> {
    row.try_get(index).map_err(|err| DriverError::Decode {
        column: name,
        reason: err.to_string(),
    })
}

fn read_row(row: &Row) -> Result<ObservationRow, DriverError> {
    let track: Option<String> = column(row, 9, "Axis")?;
    let axis = match track {
        Some(wkt) => {
            let start: NaiveDateTime = column(row, 10, "StartTime")?;
            let stop: NaiveDateTime = column(row, 11, "StopTime")?;
            Some(AxisRow {
                track: wkt,
                start_time: start.and_utc(),
                stop_time: stop.and_utc(),
            })
        }
        None => None,
    };
    let id: i32 = column(row, 0, "ID")?;
    let start: NaiveDateTime = column(row, 1, "StartDate")?;
    let stop: NaiveDateTime = column(row, 2, "StopDate")?;
    let sensor_id: i32 = column(row, 5, "SensorId")?;
    Ok(ObservationRow {
        id: i64::from(id),
        start_time: start.and_utc(),
        stop_time: stop.and_utc(),
        node_type: column(row, 3, "NodeType")?,
        geo_bounds: column(row, 4, "GeoBounds")?,
        version: column(row, 6, "Version")?,
        data_file: column(row, 7, "DataFile")?,
        sensor_id: Some(i64::from(sensor_id)),
        sensor_name: column(row, 8, "Name")?,
        axis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn descriptor_credentials_override_url() {
        let config = ConnectionConfig::new("jdbc:postgresql://localhost:5432/test")
            .with_credentials("fiduceo", "secret")
            .with_timeout_secs(30);
        let client = client_config(&config).expect("valid url");
        assert_eq!(client.get_user(), Some("fiduceo"));
        assert_eq!(client.get_dbname(), Some("test"));
        assert_eq!(client.get_connect_timeout(), Some(&Duration::from_secs(30)));
    }

    #[rstest]
    fn rejects_non_postgres_urls() {
        let config = ConnectionConfig::new("jdbc:postgresql:not a url at all?=");
        assert!(matches!(
            client_config(&config),
            Err(DriverError::InvalidUrl { .. })
        ));
    }

    #[rstest]
    fn unopened_driver_is_closed() {
        let driver = PostGisDriver::new();
        assert!(matches!(driver.is_initialized(), Err(DriverError::Closed)));
    }

    #[rstest]
    fn query_converts_geometries_to_text() {
        let start = Utc
            .with_ymd_and_hms(2011, 3, 13, 7, 6, 40)
            .single()
            .expect("valid");
        let parameter = QueryParameter::default().with_start_time(start);
        assert_eq!(
            create_paged_sql_with_projection(PROJECTION, Some(&parameter)),
            "SELECT obs.ID, obs.StartDate, obs.StopDate, obs.NodeType, \
             ST_AsText(obs.GeoBounds), obs.SensorId, obs.Version, obs.DataFile, sen.Name, \
             ST_AsText(axis.Axis), axis.StartTime, axis.StopTime \
             FROM SATELLITE_OBSERVATION obs INNER JOIN SENSOR sen ON obs.SensorId = sen.ID \
             LEFT OUTER JOIN TIMEAXIS axis ON obs.ID = axis.ObservationId \
             WHERE obs.stopDate >= '2011-03-13 07:06:40.0' ORDER by obs.ID "
        );
    }

    #[rstest]
    fn pages_are_chosen_by_observation_id() {
        let parameter = QueryParameter::default().with_page_size(1).with_offset(1);
        let sql = create_paged_sql_with_projection(PROJECTION, Some(&parameter));
        assert!(sql.starts_with("SELECT obs.ID, obs.StartDate"));
        assert!(sql.ends_with(
            "WHERE obs.ID IN (SELECT obs.ID FROM SATELLITE_OBSERVATION obs \
             INNER JOIN SENSOR sen ON obs.SensorId = sen.ID ORDER by obs.ID  \
             LIMIT 1 OFFSET 1) ORDER by obs.ID "
        ));
    }

    #[rstest]
    fn closing_twice_is_harmless() {
        let mut driver = PostGisDriver::new();
        driver.close();
        driver.close();
        assert!(matches!(driver.query_all(), Err(DriverError::Closed)));
    }
}
