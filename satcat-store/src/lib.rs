//! Storage layer of the satellite observation catalog.
//!
//! [`Catalog`] is the entry point: it validates a [`ConnectionConfig`],
//! resolves a backend [`Driver`] from the URL scheme through the
//! [`registry`], and exposes initialise, insert, query and clear operations.
//! Relational drivers share the SQL text assembled in [`sql`].
//!
//! Backends are selected by cargo feature:
//!
//! | Feature         | Scheme            | Backend                  |
//! |-----------------|-------------------|--------------------------|
//! | `store-sqlite`  | `jdbc:h2`         | embedded SQLite          |
//! | `store-postgis` | `jdbc:postgresql` | PostgreSQL with PostGIS  |
//! | `store-mysql`   | `jdbc:mysql`      | MySQL                    |
//! | `store-mongodb` | `mongodb`         | MongoDB                  |

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod catalog;
mod config;
pub mod driver;
pub mod registry;
pub mod sql;

pub use catalog::{Catalog, CatalogError, CatalogState};
pub use config::{ConfigError, ConnectionConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_TIMEOUT_SECS};
pub use driver::{Driver, DriverError, DriverKind};
