//! Query execution and transaction contracts
//!
//! [`QueryExecutor`] is the smallest surface: run one parameterized statement.
//! [`DatabaseAdapter`] adds transaction management and is implemented by each
//! backend. [`Transaction`] is an executor bound to one pooled connection until
//! it is committed or rolled back.

use super::error::Result;
use super::result_set::ResultSet;
use super::value::SqlValue;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Executes parameterized SQL statements
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute `sql` with positional `?` parameters
    ///
    /// # Errors
    ///
    /// Returns one of `InvalidConfigurationOptions`, `ConnectionFailed`,
    /// `UniqueConstraintViolationCheckFailed` or `StorageInteractingFailed`.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet>;
}

/// Decodes the backend's textual encoding of binary columns
pub trait BinaryDataDecoder: Send + Sync {
    /// Turn an encoded payload into raw bytes
    fn unescape_binary(&self, payload: &[u8]) -> Vec<u8>;
}

/// A unit of work bound to a single connection
///
/// `commit` and `rollback` consume the transaction; the connection is released
/// exactly once by whichever of them runs.
#[async_trait]
pub trait Transaction: QueryExecutor + BinaryDataDecoder {
    /// Commit the transaction, releasing the connection in every case
    ///
    /// # Errors
    ///
    /// Returns the normalized commit failure after the connection is released.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll back the transaction; failures are logged and suppressed
    async fn rollback(self: Box<Self>);

    /// View the transaction as a plain executor
    fn as_executor(&self) -> &dyn QueryExecutor;
}

/// Backend entry point: statement execution plus transaction management
#[async_trait]
pub trait DatabaseAdapter: QueryExecutor + BinaryDataDecoder {
    /// Begin a transaction on a dedicated connection
    ///
    /// # Errors
    ///
    /// Returns a connection error if no connection can be acquired, or the
    /// normalized BEGIN failure. The connection is released in both cases.
    async fn transaction(&self) -> Result<Box<dyn Transaction>>;
}

/// Body of [`Transactional::transactional`]
pub type TransactionBody<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Commit-or-rollback wrapper available on every adapter
#[async_trait]
pub trait Transactional: DatabaseAdapter {
    /// Run `body` inside a transaction
    ///
    /// Commits when `body` succeeds. Otherwise rolls back and returns the
    /// error produced by `body` unchanged.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use service_bus_storage::prelude::*;
    /// # async fn example(adapter: &SqliteAdapter) -> Result<()> {
    /// adapter
    ///     .transactional(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute("INSERT INTO accounts (balance) VALUES (?)", &[100.into()])
    ///                 .await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn transactional<T, F>(&self, body: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a dyn QueryExecutor) -> TransactionBody<'a, T> + Send,
    {
        let transaction = self.transaction().await?;

        let outcome = body(transaction.as_executor()).await;
        match outcome {
            Ok(value) => {
                transaction.commit().await?;
                Ok(value)
            }
            Err(error) => {
                transaction.rollback().await;
                Err(error)
            }
        }
    }
}

impl<A: DatabaseAdapter + ?Sized> Transactional for A {}

#[async_trait]
impl<E: QueryExecutor + ?Sized> QueryExecutor for Arc<E> {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        (**self).execute(sql, params).await
    }
}

impl<D: BinaryDataDecoder + ?Sized> BinaryDataDecoder for Arc<D> {
    fn unescape_binary(&self, payload: &[u8]) -> Vec<u8> {
        (**self).unescape_binary(payload)
    }
}

#[async_trait]
impl<A: DatabaseAdapter + ?Sized> DatabaseAdapter for Arc<A> {
    async fn transaction(&self) -> Result<Box<dyn Transaction>> {
        (**self).transaction().await
    }
}
