//! Database backend implementations
//!
//! Each backend is behind its cargo feature. [`adapter_from_dsn`] picks the
//! backend from the DSN scheme.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
mod postgres_types;

#[cfg(feature = "sqlite")]
pub use sqlite::{adapt_sqlite_error, SqliteAdapter, SqliteTransaction};

#[cfg(feature = "postgres")]
pub use postgres::{adapt_postgres_error, PostgresAdapter, PostgresTransaction};

use crate::core::configuration::StorageConfiguration;
use crate::core::database_types::BackendKind;
use crate::core::error::{Result, StorageError};
use crate::core::executor::DatabaseAdapter;
use std::sync::Arc;

/// Build the adapter matching the DSN scheme
///
/// # Errors
///
/// Returns [`StorageError::InvalidConfigurationOptions`] for malformed DSNs,
/// unknown schemes and backends compiled out of this build.
pub fn adapter_from_dsn(dsn: &str) -> Result<Arc<dyn DatabaseAdapter>> {
    let configuration = StorageConfiguration::parse(dsn)?;

    match configuration.backend()? {
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => Ok(Arc::new(SqliteAdapter::new(configuration)?)),
        #[cfg(feature = "postgres")]
        BackendKind::Postgres => Ok(Arc::new(PostgresAdapter::new(configuration)?)),
        #[allow(unreachable_patterns)]
        other => Err(StorageError::invalid_configuration(format!(
            "Backend \"{}\" is not enabled in this build",
            other
        ))),
    }
}
