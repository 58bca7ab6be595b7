//! Core storage types and traits
//!
//! Backend-independent building blocks: configuration, values, result sets,
//! executor contracts, query helpers, finders and migrations.

pub mod binary;
pub mod configuration;
pub mod database_types;
pub mod error;
pub mod executor;
pub mod finder;
pub mod functions;
pub mod migration;
pub mod query_builder;
pub mod result_set;
pub mod value;

// Re-export commonly used types
pub use configuration::StorageConfiguration;
pub use database_types::BackendKind;
pub use error::{Result, StorageError};
pub use executor::{
    BinaryDataDecoder, DatabaseAdapter, QueryExecutor, Transaction, TransactionBody, Transactional,
};
pub use finder::{CacheAdapter, CachedSqlFinder, InMemoryCacheAdapter, SimpleSqlFinder, SqlFinder};
pub use migration::{
    Migration, MigrationDirection, MigrationLoader, MigrationProcessor, MigrationStatements,
};
pub use query_builder::{
    CompiledQuery, Criteria, DeleteBuilder, InsertBuilder, Operator, OrderBy, OrderDirection,
    SelectBuilder, UpdateBuilder,
};
pub use result_set::{ResultSet, RowStream};
pub use value::{Row, SqlValue};
