//! Embedded SQLite adapter
//!
//! Connections come from a `deadpool-sqlite` pool and every statement runs on
//! the pool's blocking worker through `interact`. Rows are buffered when the
//! statement executes, so result sets carry the connection's last insert rowid.
//!
//! An in-memory database lives inside a single connection, which is why the
//! pool holds one connection unless `max_connections` says otherwise.

use crate::core::configuration::StorageConfiguration;
use crate::core::database_types::BackendKind;
use crate::core::error::{Result, StorageError};
use crate::core::executor::{BinaryDataDecoder, DatabaseAdapter, QueryExecutor, Transaction};
use crate::core::functions::log_statement;
use crate::core::result_set::ResultSet;
use crate::core::value::{Row, SqlValue};
use async_trait::async_trait;
use deadpool_sqlite::{Config, Object, Pool, PoolConfig, Runtime};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{ffi, params_from_iter, Connection, ErrorCode, ToSql};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

const IN_MEMORY: &str = ":memory:";
const DEFAULT_MAX_CONNECTIONS: usize = 1;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            SqlValue::Long(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Double(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::String(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

/// Map a driver failure onto the storage error taxonomy
pub fn adapt_sqlite_error(error: rusqlite::Error) -> StorageError {
    let message = error.to_string().replace(['\r', '\n'], "");

    let adapted = match &error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation
                if matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE
                        | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                ) =>
            {
                StorageError::unique_constraint_violation(message)
            }
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::AuthorizationForStatementDenied => StorageError::connection_failed(message),
            _ => StorageError::storage_interacting(message),
        },
        rusqlite::Error::InvalidPath(_) => StorageError::connection_failed(message),
        _ => StorageError::storage_interacting(message),
    };

    adapted.with_source(Box::new(error))
}

fn row_from_sqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let statement = row.as_ref();
    let mut converted = Row::with_capacity(statement.column_count());

    for i in 0..statement.column_count() {
        let column = statement.column_name(i)?.to_string();
        let value = match row.get_ref(i)? {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Long(v),
            ValueRef::Real(v) => SqlValue::Double(v),
            ValueRef::Text(v) => SqlValue::String(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => SqlValue::Bytes(v.to_vec()),
        };
        converted.insert(column, value);
    }

    Ok(converted)
}

fn last_insert_id(connection: &Connection) -> Option<String> {
    match connection.last_insert_rowid() {
        0 => None,
        id => Some(id.to_string()),
    }
}

fn run_statement(connection: &Connection, sql: &str, params: &[SqlValue]) -> rusqlite::Result<ResultSet> {
    let mut statement = connection.prepare(sql)?;

    if statement.column_count() == 0 {
        let affected = statement.execute(params_from_iter(params.iter()))?;
        return Ok(ResultSet::buffered(
            VecDeque::new(),
            affected as u64,
            last_insert_id(connection),
        ));
    }

    let readonly = statement.readonly();
    let rows = statement
        .query_map(params_from_iter(params.iter()), row_from_sqlite)?
        .collect::<rusqlite::Result<VecDeque<Row>>>()?;
    let affected = if readonly { 0 } else { connection.changes() as u64 };

    Ok(ResultSet::buffered(rows, affected, last_insert_id(connection)))
}

/// Bring a pooled connection back to autocommit before handing it out
fn prepare_connection(connection: &Connection) -> rusqlite::Result<()> {
    if !connection.is_autocommit() {
        warn!("rolling back a transaction abandoned on a pooled SQLite connection");
        connection.execute_batch("ROLLBACK")?;
    }
    connection.execute_batch("PRAGMA foreign_keys = ON")
}

async fn interact<T, F>(connection: &Object, work: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
{
    connection
        .interact(work)
        .await
        .map_err(|e| StorageError::storage_interacting(format!("SQLite worker failed: {}", e)))?
        .map_err(adapt_sqlite_error)
}

/// SQLite implementation of [`DatabaseAdapter`]
///
/// # Example
///
/// ```no_run
/// use service_bus_storage::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let adapter = SqliteAdapter::from_dsn("sqlite:////var/lib/app/storage.db?max_connections=4")?;
/// adapter
///     .execute("CREATE TABLE IF NOT EXISTS events (id INTEGER PRIMARY KEY, payload TEXT)", &[])
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteAdapter {
    configuration: StorageConfiguration,
    pool: Pool,
}

impl SqliteAdapter {
    /// Build an adapter; no connection is opened until the first statement
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfigurationOptions`] for a non-SQLite
    /// scheme, a bad `max_connections` value or a pool that cannot be built.
    pub fn new(configuration: StorageConfiguration) -> Result<Self> {
        let backend = configuration.backend()?;
        if backend != BackendKind::Sqlite {
            return Err(StorageError::invalid_configuration(format!(
                "\"{}\" is not an SQLite DSN",
                configuration.scheme()
            )));
        }

        let max_connections = configuration
            .query_parameter_as::<usize>("max_connections")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
            .max(1);
        let path = configuration.database_name().unwrap_or(IN_MEMORY).to_string();

        let mut pool_config = Config::new(path.as_str());
        pool_config.pool = Some(PoolConfig::new(max_connections));
        let pool = pool_config.create_pool(Runtime::Tokio1).map_err(|e| {
            StorageError::invalid_configuration(format!("Failed to create SQLite pool: {}", e))
                .with_source(Box::new(e))
        })?;

        info!(path = %path, max_connections, "SQLite pool created");

        Ok(Self {
            configuration,
            pool,
        })
    }

    /// Parse `dsn` and build an adapter
    ///
    /// # Errors
    ///
    /// See [`StorageConfiguration::parse`] and [`SqliteAdapter::new`].
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        Self::new(StorageConfiguration::parse(dsn)?)
    }

    /// Private in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error only if the pool cannot be built.
    pub fn in_memory() -> Result<Self> {
        Self::from_dsn("sqlite:///:memory:")
    }

    pub fn configuration(&self) -> &StorageConfiguration {
        &self.configuration
    }

    async fn acquire(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::connection_failed(format!("Failed to acquire SQLite connection: {}", e))
                .with_source(Box::new(e))
        })
    }
}

#[async_trait]
impl QueryExecutor for SqliteAdapter {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        log_statement(sql, params);

        let connection = self.acquire().await?;
        let sql = sql.to_string();
        let params = params.to_vec();

        interact(&connection, move |conn| {
            prepare_connection(conn)?;
            run_statement(conn, &sql, &params)
        })
        .await
    }
}

impl BinaryDataDecoder for SqliteAdapter {
    fn unescape_binary(&self, payload: &[u8]) -> Vec<u8> {
        payload.to_vec()
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn transaction(&self) -> Result<Box<dyn Transaction>> {
        let connection = self.acquire().await?;

        interact(&connection, |conn| {
            prepare_connection(conn)?;
            conn.execute_batch("BEGIN")
        })
        .await?;
        debug!("SQLite transaction started");

        Ok(Box::new(SqliteTransaction {
            connection: Some(connection),
        }))
    }
}

impl Drop for SqliteAdapter {
    fn drop(&mut self) {
        self.pool.close();
    }
}

/// Transaction bound to one pooled SQLite connection
pub struct SqliteTransaction {
    connection: Option<Object>,
}

impl SqliteTransaction {
    fn connection(&self) -> Result<&Object> {
        self.connection
            .as_ref()
            .ok_or_else(|| StorageError::storage_interacting("Transaction already finalized"))
    }
}

#[async_trait]
impl QueryExecutor for SqliteTransaction {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        log_statement(sql, params);

        let sql = sql.to_string();
        let params = params.to_vec();
        interact(self.connection()?, move |conn| run_statement(conn, &sql, &params)).await
    }
}

impl BinaryDataDecoder for SqliteTransaction {
    fn unescape_binary(&self, payload: &[u8]) -> Vec<u8> {
        payload.to_vec()
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let Some(connection) = this.connection.take() else {
            return Ok(());
        };

        let outcome = interact(&connection, |conn| conn.execute_batch("COMMIT")).await;
        // A failed COMMIT leaves the transaction open; the next checkout rolls it back.
        drop(connection);

        outcome?;
        debug!("SQLite transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        let mut this = self;
        let Some(connection) = this.connection.take() else {
            return;
        };

        match interact(&connection, |conn| conn.execute_batch("ROLLBACK")).await {
            Ok(()) => debug!("SQLite transaction rolled back"),
            Err(error) => warn!(%error, "SQLite rollback failed"),
        }
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.connection.is_some() {
            warn!("SQLite transaction dropped without commit or rollback");
        }
    }
}
