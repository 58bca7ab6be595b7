//! PostgreSQL adapter
//!
//! The `deadpool-postgres` pool is built on first use and trimmed by a
//! background task that closes connections idle for longer than
//! `idle_timeout`. Statements are prepared through the per-connection cache;
//! queries that return rows are streamed back through [`RowStream`].

use crate::core::configuration::StorageConfiguration;
use crate::core::database_types::BackendKind;
use crate::core::error::{Result, StorageError};
use crate::core::executor::{BinaryDataDecoder, DatabaseAdapter, QueryExecutor, Transaction};
use crate::core::functions::log_statement;
use crate::core::binary::decode_bytea;
use crate::core::result_set::{ResultSet, RowStream};
use crate::core::value::{Row, SqlValue};
use super::postgres_types::{PgParam, PgValue};
use async_trait::async_trait;
use deadpool_postgres::{
    ClientWrapper, Manager, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime,
};
use futures::TryStreamExt;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_MAX_CONNECTIONS: usize = 100;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_ATTEMPTS: u32 = 3;

const BEGIN: &str = "BEGIN TRANSACTION ISOLATION LEVEL READ COMMITTED";

/// Map a driver failure onto the storage error taxonomy
pub fn adapt_postgres_error(error: tokio_postgres::Error) -> StorageError {
    let message = error.to_string().replace(['\r', '\n'], "");

    let adapted = match error.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION || *code == SqlState::FOREIGN_KEY_VIOLATION => {
            StorageError::unique_constraint_violation(message)
        }
        Some(code) if code.code().starts_with("08") || code.code().starts_with("28") => {
            StorageError::connection_failed(message)
        }
        Some(_) => StorageError::storage_interacting(message),
        None if error.is_closed() || is_io_failure(&error) => StorageError::connection_failed(message),
        None => StorageError::storage_interacting(message),
    };

    adapted.with_source(Box::new(error))
}

fn is_io_failure(error: &tokio_postgres::Error) -> bool {
    error
        .source()
        .map_or(false, |source| source.is::<std::io::Error>())
}

/// Rewrite `?` placeholders to `$1`, `$2`, ...
///
/// Quoted text, comments and dollar-quoted bodies are copied verbatim.
fn rewrite_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let bytes = sql.as_bytes();
    let mut rewritten = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        i = match bytes[i] {
            quote @ (b'\'' | b'"') => skip_past(bytes, i + 1, quote),
            b'-' if bytes.get(i + 1) == Some(&b'-') => skip_past(bytes, i + 2, b'\n'),
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_block_comment(bytes, i),
            b'$' => skip_dollar_quoted(sql, i),
            b'?' => {
                rewritten.push_str(&sql[copied..i]);
                index += 1;
                rewritten.push('$');
                rewritten.push_str(&index.to_string());
                copied = i + 1;
                i + 1
            }
            _ => i + 1,
        };
    }

    if index == 0 {
        return Cow::Borrowed(sql);
    }
    rewritten.push_str(&sql[copied..]);
    Cow::Owned(rewritten)
}

/// Position after the next `terminator` at or after `from`
fn skip_past(bytes: &[u8], from: usize, terminator: u8) -> usize {
    bytes
        .get(from..)
        .and_then(|rest| rest.iter().position(|b| *b == terminator))
        .map_or(bytes.len(), |offset| from + offset + 1)
}

/// Block comments nest
fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte >= 0x80
}

/// Skip `$tag$ ... $tag$`; a `$` that opens no such body is a single byte
fn skip_dollar_quoted(sql: &str, start: usize) -> usize {
    let bytes = sql.as_bytes();
    if start > 0 && is_identifier_byte(bytes[start - 1]) {
        return start + 1;
    }

    let tag_len = bytes[start + 1..]
        .iter()
        .take_while(|b| **b != b'$' && is_identifier_byte(**b))
        .count();
    let tag_end = start + 1 + tag_len;
    let starts_with_digit = bytes.get(start + 1).map_or(false, u8::is_ascii_digit);
    if starts_with_digit || bytes.get(tag_end) != Some(&b'$') {
        return start + 1;
    }

    let tag = &sql[start..=tag_end];
    sql[tag_end + 1..]
        .find(tag)
        .map_or(sql.len(), |offset| tag_end + 1 + offset + tag.len())
}

fn row_from_postgres(row: &tokio_postgres::Row) -> Result<Row> {
    let mut converted = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let PgValue(value) = row
            .try_get::<_, PgValue>(idx)
            .map_err(StorageError::result_set_iteration)?;
        converted.insert(column.name(), value);
    }
    Ok(converted)
}

/// Rows of a running query
///
/// Holds the pooled client when the query ran outside a transaction, so the
/// connection is not reused before the stream is dropped.
struct PostgresRowStream {
    rows: Pin<Box<tokio_postgres::RowStream>>,
    _client: Option<Object>,
}

#[async_trait]
impl RowStream for PostgresRowStream {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        match self
            .rows
            .as_mut()
            .try_next()
            .await
            .map_err(StorageError::result_set_iteration)?
        {
            Some(row) => row_from_postgres(&row).map(Some),
            None => Ok(None),
        }
    }
}

enum Outcome {
    Command(u64),
    Rows(tokio_postgres::RowStream),
}

impl Outcome {
    fn into_result_set(self, owner: Option<Object>) -> ResultSet {
        match self {
            Outcome::Command(affected) => ResultSet::command(affected),
            Outcome::Rows(rows) => ResultSet::streaming(Box::new(PostgresRowStream {
                rows: Box::pin(rows),
                _client: owner,
            })),
        }
    }
}

async fn run_statement(client: &ClientWrapper, sql: &str, params: &[SqlValue]) -> Result<Outcome> {
    log_statement(sql, params);

    let sql = rewrite_placeholders(sql);
    let statement = client
        .prepare_cached(&sql)
        .await
        .map_err(adapt_postgres_error)?;
    let bound = params.iter().map(PgParam);

    if statement.columns().is_empty() {
        let affected = client
            .execute_raw(&statement, bound)
            .await
            .map_err(adapt_postgres_error)?;
        return Ok(Outcome::Command(affected));
    }

    let rows = client
        .query_raw(&statement, bound)
        .await
        .map_err(adapt_postgres_error)?;
    Ok(Outcome::Rows(rows))
}

/// PostgreSQL implementation of [`DatabaseAdapter`]
///
/// Recognized DSN parameters: `max_connections` (default 100) and
/// `idle_timeout` in seconds (default 60, `0` disables the reaper).
pub struct PostgresAdapter {
    configuration: StorageConfiguration,
    max_connections: usize,
    idle_timeout: Duration,
    pool: OnceCell<Pool>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresAdapter {
    /// Validate the configuration; the pool is built on first use
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfigurationOptions`] for a non-PostgreSQL
    /// scheme or unparsable pool parameters.
    pub fn new(configuration: StorageConfiguration) -> Result<Self> {
        let backend = configuration.backend()?;
        if backend != BackendKind::Postgres {
            return Err(StorageError::invalid_configuration(format!(
                "\"{}\" is not a PostgreSQL DSN",
                configuration.scheme()
            )));
        }

        let max_connections = configuration
            .query_parameter_as::<usize>("max_connections")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
            .max(1);
        let idle_timeout = configuration
            .query_parameter_as::<u64>("idle_timeout")?
            .map_or(DEFAULT_IDLE_TIMEOUT, Duration::from_secs);

        Ok(Self {
            configuration,
            max_connections,
            idle_timeout,
            pool: OnceCell::new(),
            reaper: Mutex::new(None),
        })
    }

    /// Parse `dsn` and build an adapter
    ///
    /// # Errors
    ///
    /// See [`StorageConfiguration::parse`] and [`PostgresAdapter::new`].
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        Self::new(StorageConfiguration::parse(dsn)?)
    }

    pub fn configuration(&self) -> &StorageConfiguration {
        &self.configuration
    }

    fn driver_config(&self) -> tokio_postgres::Config {
        let configuration = &self.configuration;
        let mut config = tokio_postgres::Config::new();
        config
            .host(configuration.host())
            .port(configuration.port().unwrap_or(DEFAULT_PORT))
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(user) = configuration.username() {
            config.user(user);
        }
        if let Some(password) = configuration.password() {
            config.password(password);
        }
        if let Some(database) = configuration.database_name() {
            config.dbname(database);
        }
        config
    }

    fn build_pool(&self) -> Result<Pool> {
        let manager = Manager::from_config(
            self.driver_config(),
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(self.max_connections)
            .create_timeout(Some(CONNECT_TIMEOUT))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                StorageError::invalid_configuration(format!(
                    "Failed to create PostgreSQL pool: {}",
                    e
                ))
                .with_source(Box::new(e))
            })?;

        if !self.idle_timeout.is_zero() {
            *self.reaper.lock() = Some(spawn_idle_reaper(pool.clone(), self.idle_timeout));
        }

        info!(
            host = %self.configuration.host(),
            database = ?self.configuration.database_name(),
            max_connections = self.max_connections,
            idle_timeout_secs = self.idle_timeout.as_secs(),
            "PostgreSQL pool created"
        );
        Ok(pool)
    }

    async fn pool(&self) -> Result<&Pool> {
        self.pool.get_or_try_init(|| async { self.build_pool() }).await
    }

    async fn acquire(&self) -> Result<Object> {
        let pool = self.pool().await?;

        let mut attempt = 1;
        loop {
            match pool.get().await {
                Ok(client) => return Ok(client),
                Err(error @ (PoolError::Timeout(_) | PoolError::Backend(_)))
                    if attempt < CONNECT_ATTEMPTS =>
                {
                    warn!(attempt, %error, "PostgreSQL connection attempt failed, retrying");
                    attempt += 1;
                }
                Err(error) => {
                    return Err(StorageError::connection_failed(format!(
                        "Failed to connect to PostgreSQL after {} attempt(s): {}",
                        attempt, error
                    ))
                    .with_source(Box::new(error)))
                }
            }
        }
    }
}

fn spawn_idle_reaper(pool: Pool, idle_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(idle_timeout);
        interval.tick().await;
        loop {
            interval.tick().await;
            pool.retain(|_, metrics| metrics.last_used() < idle_timeout);
            debug!(size = pool.status().size, "idle PostgreSQL connections trimmed");
        }
    })
}

#[async_trait]
impl QueryExecutor for PostgresAdapter {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let client = self.acquire().await?;
        let outcome = run_statement(&client, sql, params).await?;
        Ok(outcome.into_result_set(Some(client)))
    }
}

/// Decodes the text form of `bytea` (`\x...` or escape format); `bytea`
/// columns are already delivered as raw bytes
impl BinaryDataDecoder for PostgresAdapter {
    fn unescape_binary(&self, payload: &[u8]) -> Vec<u8> {
        decode_bytea(payload)
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn transaction(&self) -> Result<Box<dyn Transaction>> {
        let client = self.acquire().await?;
        client
            .batch_execute(BEGIN)
            .await
            .map_err(adapt_postgres_error)?;
        debug!("PostgreSQL transaction started");

        Ok(Box::new(PostgresTransaction {
            client: Some(client),
        }))
    }
}

impl Drop for PostgresAdapter {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
        if let Some(pool) = self.pool.get() {
            pool.close();
        }
    }
}

/// Transaction bound to one pooled PostgreSQL connection
pub struct PostgresTransaction {
    client: Option<Object>,
}

impl PostgresTransaction {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| StorageError::storage_interacting("Transaction already finalized"))
    }
}

/// Remove a connection in an unknown state from the pool and close it
fn detach(client: Object) {
    drop(Object::take(client));
}

#[async_trait]
impl QueryExecutor for PostgresTransaction {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let outcome = run_statement(self.client()?, sql, params).await?;
        Ok(outcome.into_result_set(None))
    }
}

impl BinaryDataDecoder for PostgresTransaction {
    fn unescape_binary(&self, payload: &[u8]) -> Vec<u8> {
        decode_bytea(payload)
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let Some(client) = this.client.take() else {
            return Ok(());
        };

        match client.batch_execute("COMMIT").await {
            Ok(()) => {
                debug!("PostgreSQL transaction committed");
                Ok(())
            }
            Err(error) => {
                detach(client);
                Err(adapt_postgres_error(error))
            }
        }
    }

    async fn rollback(self: Box<Self>) {
        let mut this = self;
        let Some(client) = this.client.take() else {
            return;
        };

        match client.batch_execute("ROLLBACK").await {
            Ok(()) => debug!("PostgreSQL transaction rolled back"),
            Err(error) => {
                warn!(%error, "PostgreSQL rollback failed");
                detach(client);
            }
        }
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            warn!("PostgreSQL transaction dropped without commit or rollback");
            detach(client);
        }
    }
}
