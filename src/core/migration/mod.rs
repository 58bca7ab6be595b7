//! Forward-only schema migrations
//!
//! A migration is a type implementing [`Migration`]. Its `up` and `down` hooks
//! record statements through [`MigrationStatements::add`]; nothing runs until
//! the [`MigrationProcessor`] asks for them.
//!
//! # Example
//!
//! ```rust
//! use service_bus_storage::core::migration::{Migration, MigrationDirection, MigrationStatements};
//!
//! #[derive(Default)]
//! struct Version202001152036;
//!
//! impl Migration for Version202001152036 {
//!     fn up(&self, statements: &mut MigrationStatements) {
//!         statements.add("CREATE TABLE customer (id uuid PRIMARY KEY, name varchar NOT NULL)", &[]);
//!     }
//!
//!     fn down(&self, statements: &mut MigrationStatements) {
//!         statements.add("DROP TABLE customer", &[]);
//!     }
//! }
//!
//! let statements = Version202001152036.apply(MigrationDirection::Up);
//! assert_eq!(statements.len(), 1);
//! ```

pub mod loader;
pub mod processor;

pub use loader::{MigrationFactory, MigrationLoader};
pub use processor::MigrationProcessor;

use crate::core::value::SqlValue;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Which hook of a migration runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationDirection {
    Up,
    Down,
}

impl std::fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Statement list filled by the migration hooks
///
/// Parameters are stored under a digest of the SQL text, so adding the same
/// text twice keeps one parameter list for it.
#[derive(Debug, Default, Clone)]
pub struct MigrationStatements {
    queries: Vec<String>,
    parameters: HashMap<String, Vec<SqlValue>>,
}

impl MigrationStatements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a statement; empty SQL is ignored
    pub fn add(&mut self, sql: impl Into<String>, params: &[SqlValue]) {
        let sql = sql.into();
        if sql.is_empty() {
            return;
        }
        self.parameters.insert(statement_key(&sql), params.to_vec());
        self.queries.push(sql);
    }

    /// Number of recorded statements
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Statements in the order they were added, each with its parameters
    pub fn into_statements(self) -> Vec<(String, Vec<SqlValue>)> {
        let Self {
            queries,
            parameters,
        } = self;

        queries
            .into_iter()
            .map(|sql| {
                let params = parameters
                    .get(&statement_key(&sql))
                    .cloned()
                    .unwrap_or_default();
                (sql, params)
            })
            .collect()
    }
}

fn statement_key(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

/// A schema change unit
pub trait Migration: Send + Sync {
    /// Record the statements that apply the change
    fn up(&self, statements: &mut MigrationStatements);

    /// Record the statements that revert the change
    fn down(&self, statements: &mut MigrationStatements);

    /// Statements for `direction`, in the order they were added
    fn apply(&self, direction: MigrationDirection) -> Vec<(String, Vec<SqlValue>)> {
        let mut statements = MigrationStatements::new();
        match direction {
            MigrationDirection::Up => self.up(&mut statements),
            MigrationDirection::Down => self.down(&mut statements),
        }
        statements.into_statements()
    }
}
