//! Document-store driver for `mongodb` URLs.
//!
//! Observations live in one collection with the sensor and time axes embedded
//! as sub-documents. Footprints and tracks are stored as GeoJSON so the
//! `2dsphere` index can answer `$geoIntersects` filters.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use mongodb::bson::document::ValueAccessError;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::{ClientOptions, Credential};
use mongodb::sync::{Client, Collection, Database};
use mongodb::IndexModel;
use satcat_core::{
    Geometry, GeometryEngine, NativeFormat, NativeGeometry, NodeType, QueryParameter,
    SatelliteObservation, Sensor,
};

use super::{BackendContext, Driver, DriverError, DriverKind};
use crate::config::ConnectionConfig;

const URL_PATTERN: &str = "mongodb";
const DEFAULT_DATABASE: &str = "satcat";
const COLLECTION: &str = "SATELLITE_OBSERVATION";

const DATA_FILE_KEY: &str = "dataFile";
const START_TIME_KEY: &str = "startTime";
const STOP_TIME_KEY: &str = "stopTime";
const END_TIME_KEY: &str = "endTime";
const NODE_TYPE_KEY: &str = "nodeType";
const GEO_BOUNDS_KEY: &str = "geoBounds";
const GEOMETRY_KEY: &str = "geometry";
const SENSOR_KEY: &str = "sensor";
const SENSOR_NAME_KEY: &str = "sensor.name";
const TIME_AXES_KEY: &str = "timeAxes";
const VERSION_KEY: &str = "version";

struct Connected {
    client: Client,
    database: Database,
    engine: Arc<dyn GeometryEngine>,
}

impl Connected {
    fn observations(&self) -> Collection<Document> {
        self.database.collection(COLLECTION)
    }
}

/// MongoDB driver registered for the `mongodb` scheme.
#[derive(Default)]
pub struct MongoDriver {
    connected: Option<Connected>,
}

impl fmt::Debug for MongoDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDriver")
            .field(
                "database",
                &self.connected.as_ref().map(|open| open.database.name()),
            )
            .finish_non_exhaustive()
    }
}

impl MongoDriver {
    /// An unopened driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connected(&self) -> Result<&Connected, DriverError> {
        self.connected.as_ref().ok_or(DriverError::Closed)
    }
}

/// Client options for `config` with the descriptor's timeout, pool size and
/// credentials applied.
fn client_options(config: &ConnectionConfig) -> Result<ClientOptions, DriverError> {
    let url = config.url.trim();
    let mut options = ClientOptions::parse(url)
        .run()
        .map_err(|_| DriverError::InvalidUrl {
            url: url.to_owned(),
            reason: "not a MongoDB connection string",
        })?;
    options.connect_timeout = Some(config.timeout());
    options.server_selection_timeout = Some(config.timeout());
    options.max_idle_time = Some(config.timeout());
    options.max_pool_size = Some(config.max_connections);
    if let Some((user, password)) = config.credentials() {
        options.credential = Some(
            Credential::builder()
                .username(user.to_owned())
                .password(password.to_owned())
                .build(),
        );
    }
    Ok(options)
}

/// Database named in the URL path, or the catalog default.
fn database_name(options: &ClientOptions) -> String {
    options
        .default_database
        .clone()
        .unwrap_or_else(|| DEFAULT_DATABASE.to_owned())
}

impl Driver for MongoDriver {
    fn url_pattern(&self) -> &'static str {
        URL_PATTERN
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Document
    }

    fn open(
        &mut self,
        config: &ConnectionConfig,
        engine: Arc<dyn GeometryEngine>,
    ) -> Result<(), DriverError> {
        let options = client_options(config)?;
        let name = database_name(&options);
        let client = Client::with_options(options).backend("create client")?;
        let database = client.database(&name);
        info!("opened MongoDB catalog database {name}");
        self.connected = Some(Connected {
            client,
            database,
            engine,
        });
        Ok(())
    }

    fn is_initialized(&self) -> Result<bool, DriverError> {
        let names = self
            .connected()?
            .database
            .list_collection_names()
            .run()
            .backend("list collections")?;
        Ok(names.iter().any(|name| name == COLLECTION))
    }

    fn initialize_schema(&self) -> Result<(), DriverError> {
        let observations = self.connected()?.observations();
        let indexes = [
            doc! { START_TIME_KEY: 1 },
            doc! { STOP_TIME_KEY: 1 },
            doc! { SENSOR_NAME_KEY: 1 },
            doc! { GEO_BOUNDS_KEY: "2dsphere" },
        ]
        .into_iter()
        .map(|keys| IndexModel::builder().keys(keys).build());
        observations
            .create_indexes(indexes)
            .run()
            .backend("create indexes")?;
        Ok(())
    }

    fn insert_sensor(&self, _sensor: &Sensor) -> Result<Option<i64>, DriverError> {
        self.connected()?;
        Ok(None)
    }

    fn insert_observation(&self, observation: &SatelliteObservation) -> Result<(), DriverError> {
        let connected = self.connected()?;
        let document = observation_document(connected.engine.as_ref(), observation)?;
        connected
            .observations()
            .insert_one(document)
            .run()
            .backend("insert observation")?;
        Ok(())
    }

    fn query(
        &self,
        parameter: Option<&QueryParameter>,
    ) -> Result<Vec<SatelliteObservation>, DriverError> {
        let connected = self.connected()?;
        let engine = connected.engine.as_ref();
        let filter = filter_document(engine, parameter)?;
        debug!("MongoDB filter: {filter}");
        let observations = connected.observations();
        let mut find = observations.find(filter).sort(doc! { "_id": 1 });
        if let Some(offset) = parameter.and_then(|paging| paging.offset) {
            find = find.skip(u64::from(offset));
        }
        if let Some(page_size) = parameter.and_then(|paging| paging.page_size) {
            find = find.limit(i64::from(page_size));
        }
        let cursor = find.run().backend("run query")?;
        cursor
            .map(|document| {
                let stored = document.backend("read document")?;
                observation_from_document(engine, &stored)
            })
            .collect()
    }

    fn clear_all(&self) -> Result<(), DriverError> {
        self.connected()?
            .observations()
            .drop()
            .run()
            .backend("drop collection")?;
        info!("dropped MongoDB catalog collection");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(open) = self.connected.take() {
            debug!("closed MongoDB client for {}", open.database.name());
            drop(open.client);
        }
    }
}

fn to_bson_date(instant: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(instant.timestamp_millis())
}

fn from_bson_date(
    column: &'static str,
    stored: bson::DateTime,
) -> Result<DateTime<Utc>, DriverError> {
    DateTime::from_timestamp_millis(stored.timestamp_millis()).ok_or(DriverError::Decode {
        column,
        reason: String::from("timestamp out of range"),
    })
}

fn geo_json(engine: &dyn GeometryEngine, geometry: &Geometry) -> Result<Bson, DriverError> {
    let NativeGeometry::GeoJson(value) = engine.to_native(geometry, NativeFormat::GeoJson) else {
        return Err(DriverError::Decode {
            column: GEOMETRY_KEY,
            reason: String::from("engine produced no GeoJSON"),
        });
    };
    bson::to_bson(&value).backend("encode GeoJSON")
}

fn from_geo_json(engine: &dyn GeometryEngine, stored: &Document) -> Result<Geometry, DriverError> {
    let value = Bson::Document(stored.clone()).into_relaxed_extjson();
    Ok(engine.from_native(&NativeGeometry::GeoJson(value))?)
}

/// Filter equivalent to the relational predicates, plus `$geoIntersects`
/// for a geometry criterion.
fn filter_document(
    engine: &dyn GeometryEngine,
    parameter: Option<&QueryParameter>,
) -> Result<Document, DriverError> {
    let mut filter = Document::new();
    let Some(criteria) = parameter else {
        return Ok(filter);
    };
    if let Some(start) = criteria.start_time {
        filter.insert(STOP_TIME_KEY, doc! { "$gte": to_bson_date(start) });
    }
    if let Some(stop) = criteria.stop_time {
        filter.insert(START_TIME_KEY, doc! { "$lte": to_bson_date(stop) });
    }
    if let Some(sensor) = criteria.sensor_name() {
        filter.insert(SENSOR_NAME_KEY, sensor);
    }
    if let Some(path) = criteria.path() {
        filter.insert(DATA_FILE_KEY, path);
    }
    if let Some(version) = criteria.version() {
        filter.insert(VERSION_KEY, version);
    }
    if let Some(geometry) = &criteria.geometry {
        filter.insert(
            GEO_BOUNDS_KEY,
            doc! { "$geoIntersects": { "$geometry": geo_json(engine, geometry)? } },
        );
    }
    Ok(filter)
}

fn observation_document(
    engine: &dyn GeometryEngine,
    observation: &SatelliteObservation,
) -> Result<Document, DriverError> {
    let mut document = doc! {
        DATA_FILE_KEY: observation.data_file_path.as_str(),
        START_TIME_KEY: to_bson_date(observation.start_time),
        STOP_TIME_KEY: to_bson_date(observation.stop_time),
        NODE_TYPE_KEY: observation.node_type.to_id(),
        SENSOR_KEY: { "name": observation.sensor.name.as_str() },
        VERSION_KEY: observation.version.as_str(),
    };
    if let Some(bounds) = &observation.geo_bounds {
        document.insert(GEO_BOUNDS_KEY, geo_json(engine, bounds)?);
    }
    let mut axes = Vec::with_capacity(observation.time_axes.len());
    for axis in &observation.time_axes {
        let track = Geometry::LineString(axis.geometry().clone());
        axes.push(Bson::Document(doc! {
            GEOMETRY_KEY: geo_json(engine, &track)?,
            START_TIME_KEY: to_bson_date(axis.start_time()),
            END_TIME_KEY: to_bson_date(axis.end_time()),
        }));
    }
    document.insert(TIME_AXES_KEY, axes);
    Ok(document)
}

fn field<T>(column: &'static str, value: Result<T, ValueAccessError>) -> Result<T, DriverError> {
    value.map_err(|err| DriverError::Decode {
        column,
        reason: err.to_string(),
    })
}

/// Like [`field`], but an absent key reads as `None`.
fn optional_field<T>(
    column: &'static str,
    value: Result<T, ValueAccessError>,
) -> Result<Option<T>, DriverError> {
    match value {
        Ok(found) => Ok(Some(found)),
        Err(ValueAccessError::NotPresent) => Ok(None),
        Err(err) => Err(DriverError::Decode {
            column,
            reason: err.to_string(),
        }),
    }
}

fn observation_from_document(
    engine: &dyn GeometryEngine,
    stored: &Document,
) -> Result<SatelliteObservation, DriverError> {
    let node_id = field(NODE_TYPE_KEY, stored.get_i32(NODE_TYPE_KEY))?;
    let node_type = NodeType::from_id(node_id).map_err(|err| DriverError::Decode {
        column: NODE_TYPE_KEY,
        reason: err.to_string(),
    })?;
    let sensor = field(SENSOR_KEY, stored.get_document(SENSOR_KEY))?;
    let start = field(START_TIME_KEY, stored.get_datetime(START_TIME_KEY))?;
    let stop = field(STOP_TIME_KEY, stored.get_datetime(STOP_TIME_KEY))?;
    let mut observation = SatelliteObservation::new(
        Sensor::new(field(SENSOR_NAME_KEY, sensor.get_str("name"))?),
        field(DATA_FILE_KEY, stored.get_str(DATA_FILE_KEY))?,
        from_bson_date(START_TIME_KEY, *start)?,
        from_bson_date(STOP_TIME_KEY, *stop)?,
    )?
    .with_node_type(node_type)
    .with_version(optional_field(VERSION_KEY, stored.get_str(VERSION_KEY))?.unwrap_or_default());
    if let Some(bounds) = optional_field(GEO_BOUNDS_KEY, stored.get_document(GEO_BOUNDS_KEY))? {
        observation.geo_bounds = Some(from_geo_json(engine, bounds)?);
    }
    if let Some(axes) = optional_field(TIME_AXES_KEY, stored.get_array(TIME_AXES_KEY))? {
        for entry in axes {
            let Bson::Document(axis) = entry else {
                return Err(DriverError::Decode {
                    column: TIME_AXES_KEY,
                    reason: String::from("time axis entry is not a document"),
                });
            };
            let geometry = field(GEOMETRY_KEY, axis.get_document(GEOMETRY_KEY))?;
            let track = from_geo_json(engine, geometry)?.into_line_string()?;
            let axis_start = field(START_TIME_KEY, axis.get_datetime(START_TIME_KEY))?;
            let axis_end = field(END_TIME_KEY, axis.get_datetime(END_TIME_KEY))?;
            observation.time_axes.push(engine.create_time_axis(
                track,
                from_bson_date(START_TIME_KEY, *axis_start)?,
                from_bson_date(END_TIME_KEY, *axis_end)?,
            )?);
        }
    }
    Ok(observation)
}
