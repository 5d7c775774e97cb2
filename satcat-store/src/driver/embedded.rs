//! Embedded driver answering `jdbc:h2` URLs with a SQLite database.
//!
//! `jdbc:h2:mem:<name>` opens a private in-memory database that lives as long
//! as the driver; `jdbc:h2:<path>` and `jdbc:h2:file:<path>` open a database
//! file. Geometries are stored as WKT text and timestamps as
//! [`format_timestamp`] text, so the shared SQL literals compare correctly.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::FromSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use satcat_core::{Geometry, GeometryEngine, QueryParameter, SatelliteObservation, Sensor};

use super::{
    AxisRow, BackendContext, Driver, DriverError, DriverKind, ObservationRow, assemble,
    decode_timestamp, to_wkt, warn_ignored_geometry,
};
use crate::config::ConnectionConfig;
use crate::sql::{create_paged_sql_with_projection, format_timestamp};

const URL_PATTERN: &str = "jdbc:h2";

const CREATE_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS SENSOR (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS SATELLITE_OBSERVATION (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    StartDate TEXT NOT NULL,
    StopDate TEXT NOT NULL,
    NodeType INTEGER NOT NULL,
    GeoBounds TEXT,
    SensorId INTEGER NOT NULL REFERENCES SENSOR(ID),
    Version TEXT,
    DataFile TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS TIMEAXIS (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    ObservationId INTEGER NOT NULL REFERENCES SATELLITE_OBSERVATION(ID),
    Axis TEXT NOT NULL,
    StartTime TEXT NOT NULL,
    StopTime TEXT NOT NULL
);";

const DROP_SCHEMA: &str = "\
DROP TABLE IF EXISTS TIMEAXIS;
DROP TABLE IF EXISTS SATELLITE_OBSERVATION;
DROP TABLE IF EXISTS SENSOR;";

const COUNT_TABLES: &str = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
     AND name IN ('SATELLITE_OBSERVATION', 'SENSOR', 'TIMEAXIS')";

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Memory,
    File(PathBuf),
}

impl Location {
    fn parse(url: &str) -> Result<Self, DriverError> {
        let invalid = |reason| DriverError::InvalidUrl {
            url: url.to_owned(),
            reason,
        };
        let rest = url
            .get(..URL_PATTERN.len())
            .filter(|scheme| scheme.eq_ignore_ascii_case(URL_PATTERN))
            .and_then(|_| url.get(URL_PATTERN.len()..))
            .and_then(|tail| tail.strip_prefix(':'))
            .ok_or_else(|| invalid("expected a `jdbc:h2:` URL"))?;
        if rest == "mem" || rest.starts_with("mem:") {
            return Ok(Self::Memory);
        }
        let path = rest.strip_prefix("file:").unwrap_or(rest);
        if path.is_empty() {
            return Err(invalid("database path is empty"));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

struct Connected {
    pool: Pool<SqliteConnectionManager>,
    engine: Arc<dyn GeometryEngine>,
}

/// SQLite driver registered for the `jdbc:h2` scheme.
#[derive(Default)]
pub struct EmbeddedDriver {
    connected: Option<Connected>,
}

impl fmt::Debug for EmbeddedDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedDriver")
            .field("open", &self.connected.is_some())
            .finish_non_exhaustive()
    }
}

impl EmbeddedDriver {
    /// An unopened driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connected(&self) -> Result<&Connected, DriverError> {
        self.connected.as_ref().ok_or(DriverError::Closed)
    }

    fn connection(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, DriverError> {
        self.connected()?.pool.get().backend("acquire connection")
    }
}

impl Driver for EmbeddedDriver {
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
        let location = Location::parse(config.url.trim())?;
        let builder = Pool::builder().connection_timeout(config.timeout());
        let pool = match &location {
            Location::Memory => builder
                .max_size(1)
                .max_lifetime(None)
                .idle_timeout(None)
                .build(SqliteConnectionManager::memory().with_init(enable_foreign_keys)),
            Location::File(path) => builder
                .max_size(config.max_connections)
                .idle_timeout(Some(config.timeout()))
                .build(SqliteConnectionManager::file(path).with_init(enable_foreign_keys)),
        }
        .backend("open connection pool")?;
        info!("opened embedded catalog database {location:?}");
        self.connected = Some(Connected { pool, engine });
        Ok(())
    }

    fn is_initialized(&self) -> Result<bool, DriverError> {
        let count: i64 = self
            .connection()?
            .query_row(COUNT_TABLES, [], |row| row.get(0))
            .backend("inspect schema")?;
        Ok(count == 3)
    }

    fn initialize_schema(&self) -> Result<(), DriverError> {
        self.connection()?
            .execute_batch(CREATE_SCHEMA)
            .backend("create schema")
    }

    fn insert_sensor(&self, sensor: &Sensor) -> Result<Option<i64>, DriverError> {
        let connection = self.connection()?;
        resolve_sensor(&connection, &sensor.name).map(Some)
    }

    fn insert_observation(&self, observation: &SatelliteObservation) -> Result<(), DriverError> {
        let engine = Arc::clone(&self.connected()?.engine);
        let mut connection = self.connection()?;
        let transaction = connection.transaction().backend("begin transaction")?;
        let sensor_id = resolve_sensor(&transaction, &observation.sensor.name)?;
        let bounds = observation
            .geo_bounds
            .as_ref()
            .map(|geometry| to_wkt(engine.as_ref(), geometry));
        transaction
            .execute(
                "INSERT INTO SATELLITE_OBSERVATION \
                 (StartDate, StopDate, NodeType, GeoBounds, SensorId, Version, DataFile) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    format_timestamp(observation.start_time),
                    format_timestamp(observation.stop_time),
                    observation.node_type.to_id(),
                    bounds,
                    sensor_id,
                    observation.version,
                    observation.data_file_path,
                ],
            )
            .backend("insert observation")?;
        let observation_id = transaction.last_insert_rowid();
        for axis in &observation.time_axes {
            let track = Geometry::LineString(axis.geometry().clone());
            transaction
                .execute(
                    "INSERT INTO TIMEAXIS (ObservationId, Axis, StartTime, StopTime) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        observation_id,
                        to_wkt(engine.as_ref(), &track),
                        format_timestamp(axis.start_time()),
                        format_timestamp(axis.end_time()),
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
        warn_ignored_geometry(parameter, "embedded driver");
        let engine = Arc::clone(&self.connected()?.engine);
        let connection = self.connection()?;
        let sql = create_paged_sql_with_projection("*", parameter);
        debug!("embedded query: {sql}");
        let mut statement = connection.prepare(&sql).backend("prepare query")?;
        let mut rows = statement.query([]).backend("run query")?;
        let mut decoded = Vec::new();
        while let Some(row) = rows.next().backend("read row")? {
            decoded.push(read_row(row)?);
        }
        assemble(decoded, engine.as_ref())
    }

    fn clear_all(&self) -> Result<(), DriverError> {
        self.connection()?
            .execute_batch(DROP_SCHEMA)
            .backend("drop schema")?;
        info!("dropped embedded catalog tables");
        Ok(())
    }

    fn close(&mut self) {
        if self.connected.take().is_some() {
            debug!("closed embedded catalog database");
        }
    }
}

fn enable_foreign_keys(connection: &mut Connection) -> rusqlite::Result<()> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")
}

/// Id of the sensor called `name`, inserting it when absent.
fn resolve_sensor(connection: &Connection, name: &str) -> Result<i64, DriverError> {
    let existing = connection
        .query_row("SELECT ID FROM SENSOR WHERE Name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()
        .backend("look up sensor")?;
    if let Some(id) = existing {
        debug!("reusing sensor {name} with id {id}");
        return Ok(id);
    }
    connection
        .execute("INSERT INTO SENSOR (Name) VALUES (?1)", [name])
        .backend("insert sensor")?;
    Ok(connection.last_insert_rowid())
}

fn column<T: FromSql>(row: &Row<'_>, name: &'static str) -> Result<T, DriverError> {
    row.get(name).map_err(|err| DriverError::Decode {
        column: name,
        reason: err.to_string(),
    })
}

fn read_row(row: &Row<'_>) -> Result<ObservationRow, DriverError> {
    let id: i64 = row.get(0).map_err(|err| DriverError::Decode {
        column: "ID",
        reason: err.to_string(),
    })?;
    let start_text: String = column(row, "StartDate")?;
    let stop_text: String = column(row, "StopDate")?;
    let track: Option<String> = column(row, "Axis")?;
    let axis = match track {
        Some(wkt) => {
            let axis_start: String = column(row, "StartTime")?;
            let axis_stop: String = column(row, "StopTime")?;
            Some(AxisRow {
                track: wkt,
                start_time: decode_timestamp("StartTime", &axis_start)?,
                stop_time: decode_timestamp("StopTime", &axis_stop)?,
            })
        }
        None => None,
    };
    Ok(ObservationRow {
        id,
        start_time: decode_timestamp("StartDate", &start_text)?,
        stop_time: decode_timestamp("StopDate", &stop_text)?,
        node_type: column(row, "NodeType")?,
        geo_bounds: column(row, "GeoBounds")?,
        version: column(row, "Version")?,
        data_file: column(row, "DataFile")?,
        sensor_id: column(row, "SensorId")?,
        sensor_name: column(row, "Name")?,
        axis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use satcat_core::test_support::{millis, sample_observation};
    use satcat_core::{NodeType, PlanarEngine};
    use tempfile::TempDir;

    #[fixture]
    fn memory_driver() -> EmbeddedDriver {
        let mut driver = EmbeddedDriver::new();
        driver
            .open(&ConnectionConfig::new("jdbc:h2:mem:unit"), Arc::new(PlanarEngine))
            .expect("in-memory database opens");
        driver.initialize_schema().expect("schema is created");
        driver
    }

    #[rstest]
    #[case("jdbc:h2:mem:x", Location::Memory)]
    #[case("JDBC:H2:mem", Location::Memory)]
    #[case("jdbc:h2:/tmp/catalog", Location::File(PathBuf::from("/tmp/catalog")))]
    #[case("jdbc:h2:file:data/catalog.db", Location::File(PathBuf::from("data/catalog.db")))]
    fn parses_locations(#[case] url: &str, #[case] expected: Location) {
        assert_eq!(Location::parse(url).expect("valid url"), expected);
    }

    #[rstest]
    #[case("jdbc:mysql://db/test")]
    #[case("jdbc:h2:")]
    #[case("jdbc:h2")]
    fn rejects_foreign_or_empty_urls(#[case] url: &str) {
        assert!(matches!(
            Location::parse(url),
            Err(DriverError::InvalidUrl { .. })
        ));
    }

    #[rstest]
    fn unopened_driver_is_closed() {
        let driver = EmbeddedDriver::new();
        assert!(matches!(driver.query_all(), Err(DriverError::Closed)));
    }

    #[rstest]
    fn sensors_are_reused_by_name(memory_driver: EmbeddedDriver) {
        let first = memory_driver
            .insert_sensor(&Sensor::new("amsub-n15"))
            .expect("insert");
        let again = memory_driver
            .insert_sensor(&Sensor::new("amsub-n15"))
            .expect("insert");
        let other = memory_driver
            .insert_sensor(&Sensor::new("mhs-n18"))
            .expect("insert");
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[rstest]
    fn stores_and_reads_observations(memory_driver: EmbeddedDriver) {
        let observation = sample_observation(
            &PlanarEngine,
            "amsub-n15",
            "/archive/one.nc",
            millis(1_000_000_000),
            millis(1_001_000_000),
        )
        .expect("sample");
        memory_driver
            .insert_observation(&observation)
            .expect("insert");

        let stored = memory_driver.query_all().expect("query");
        let read = stored.first().expect("one observation");
        assert_eq!(stored.len(), 1);
        assert_eq!(read.start_time, observation.start_time);
        assert_eq!(read.stop_time, observation.stop_time);
        assert_eq!(read.node_type, NodeType::Ascending);
        assert_eq!(read.sensor.name, "amsub-n15");
        assert_eq!(read.time_axes.len(), 1);
        assert_eq!(read.geo_bounds, observation.geo_bounds);
    }

    fn two_axis_observation(path: &str, start_millis: i64) -> SatelliteObservation {
        let start = millis(start_millis);
        let stop = millis(start_millis + 1_000);
        let mut observation =
            sample_observation(&PlanarEngine, "amsub-n15", path, start, stop).expect("sample");
        let track = PlanarEngine
            .parse("LINESTRING(12 5, 12 7)")
            .and_then(Geometry::into_line_string)
            .expect("valid track");
        let second = PlanarEngine
            .create_time_axis(track, start, stop)
            .expect("valid axis");
        observation.time_axes.push(second);
        observation
    }

    #[rstest]
    #[case::first_page(QueryParameter::default().with_page_size(1), vec!["/a.nc"])]
    #[case::second_page(
        QueryParameter::default().with_page_size(1).with_offset(1),
        vec!["/b.nc"]
    )]
    #[case::offset_only(QueryParameter::default().with_offset(1), vec!["/b.nc"])]
    #[case::whole_page(QueryParameter::default().with_page_size(5), vec!["/a.nc", "/b.nc"])]
    fn pages_hold_whole_observations(
        memory_driver: EmbeddedDriver,
        #[case] parameter: QueryParameter,
        #[case] expected: Vec<&str>,
    ) {
        for (path, start) in [("/a.nc", 10_000), ("/b.nc", 20_000)] {
            memory_driver
                .insert_observation(&two_axis_observation(path, start))
                .expect("insert");
        }
        let page = memory_driver.query(Some(&parameter)).expect("query");
        let paths: Vec<&str> = page
            .iter()
            .map(|observation| observation.data_file_path.as_str())
            .collect();
        assert_eq!(paths, expected);
        assert!(page.iter().all(|observation| observation.time_axes.len() == 2));
    }

    #[rstest]
    fn clearing_drops_the_schema(memory_driver: EmbeddedDriver) {
        assert!(memory_driver.is_initialized().expect("inspect"));
        memory_driver.clear_all().expect("clear");
        assert!(!memory_driver.is_initialized().expect("inspect"));
    }

    #[rstest]
    fn file_database_survives_reopening() {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("jdbc:h2:{}", dir.path().join("catalog.db").display());
        let config = ConnectionConfig::new(url);
        let observation = sample_observation(
            &PlanarEngine,
            "mhs-n18",
            "/archive/two.nc",
            millis(5_000),
            millis(9_000),
        )
        .expect("sample");

        let mut writer = EmbeddedDriver::new();
        writer
            .open(&config, Arc::new(PlanarEngine))
            .expect("open file");
        writer.initialize_schema().expect("schema");
        writer.insert_observation(&observation).expect("insert");
        writer.close();
        writer.close();

        let mut reader = EmbeddedDriver::new();
        reader
            .open(&config, Arc::new(PlanarEngine))
            .expect("reopen file");
        let key = QueryParameter::default()
            .with_sensor_name("mhs-n18")
            .with_path("/archive/two.nc");
        assert!(reader.exists_by_unique_key(&key).expect("lookup"));
        reader.close();
    }
}
