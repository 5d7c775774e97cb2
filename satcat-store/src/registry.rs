//! Driver lookup by connection URL scheme.
//!
//! Prefixes are matched case-insensitively, so `JDBC:MySQL://host/db` selects
//! the MySQL driver. A prefix whose driver was compiled out is reported as
//! [`CatalogError::DriverUnavailable`] rather than as an unknown scheme.

use log::debug;

use crate::catalog::CatalogError;
use crate::driver::Driver;

/// Scheme prefixes and the cargo feature that provides each driver.
const SCHEMES: [(&str, &str); 4] = [
    ("jdbc:h2", "store-sqlite"),
    ("jdbc:mysql", "store-mysql"),
    ("jdbc:postgresql", "store-postgis"),
    ("mongodb", "store-mongodb"),
];

/// Every scheme prefix the registry recognises, whether or not its driver
/// is compiled in.
#[must_use]
pub fn known_schemes() -> Vec<&'static str> {
    SCHEMES.iter().map(|(prefix, _)| *prefix).collect()
}

/// An unopened driver for `url`.
///
/// # Errors
/// Returns [`CatalogError::UnknownScheme`] when no prefix matches and
/// [`CatalogError::DriverUnavailable`] when the matching driver is disabled.
///
/// # Examples
/// ```
/// use satcat_store::registry::resolve;
///
/// # fn main() -> Result<(), satcat_store::CatalogError> {
/// let driver = resolve("jdbc:h2:mem:archive")?;
/// assert_eq!(driver.url_pattern(), "jdbc:h2");
/// assert!(resolve("ftp://archive").is_err());
/// # Ok(())
/// # }
/// ```
pub fn resolve(url: &str) -> Result<Box<dyn Driver>, CatalogError> {
    let trimmed = url.trim();
    let (prefix, feature) = SCHEMES
        .iter()
        .copied()
        .find(|(prefix, _)| has_prefix(trimmed, prefix))
        .ok_or_else(|| CatalogError::UnknownScheme {
            url: trimmed.to_owned(),
            known: known_schemes().join(", "),
        })?;
    let driver = instantiate(prefix).ok_or(CatalogError::DriverUnavailable {
        scheme: prefix,
        feature,
    })?;
    debug!("resolved {prefix} driver for {trimmed}");
    Ok(driver)
}

fn has_prefix(url: &str, prefix: &str) -> bool {
    url.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn instantiate(prefix: &str) -> Option<Box<dyn Driver>> {
    match prefix {
        #[cfg(feature = "store-sqlite")]
        "jdbc:h2" => Some(Box::new(crate::driver::EmbeddedDriver::new())),
        #[cfg(feature = "store-mysql")]
        "jdbc:mysql" => Some(Box::new(crate::driver::MySqlDriver::new())),
        #[cfg(feature = "store-postgis")]
        "jdbc:postgresql" => Some(Box::new(crate::driver::PostGisDriver::new())),
        #[cfg(feature = "store-mongodb")]
        "mongodb" => Some(Box::new(crate::driver::MongoDriver::new())),
        _ => None,
    }
}
