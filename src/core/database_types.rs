//! Backend kinds recognized in DSN schemes

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Storage backends supported by the adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Network attached PostgreSQL server
    Postgres,
    /// Embedded SQLite engine (file or in-memory)
    Sqlite,
}

impl BackendKind {
    /// Canonical name of the backend
    pub fn to_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::Sqlite => "sqlite",
        }
    }

    /// Embedded backends keep all rows in memory and use a local file.
    pub fn is_embedded(&self) -> bool {
        matches!(self, BackendKind::Sqlite)
    }

    /// DSN schemes that select this backend
    pub fn schemes(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Postgres => &["pgsql", "postgres", "postgresql"],
            BackendKind::Sqlite => &["sqlite", "sqlite3", "pdo_sqlite", "pdo_sqlite3"],
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let scheme = s.to_lowercase();
        [BackendKind::Postgres, BackendKind::Sqlite]
            .into_iter()
            .find(|kind| kind.schemes().contains(&scheme.as_str()))
            .ok_or_else(|| format!("Unsupported storage scheme: '{}'", s))
    }
}
