//! Migration discovery
//!
//! The loader scans a directory for files whose name contains `Version`
//! (`Version201912201932.sql`, `Version201912201932.rs`, ...). The file stem is
//! the migration identifier; the version token is the identifier without its
//! `Version` prefix. Each identifier must be registered with a factory.

use super::Migration;
use crate::core::error::{Result, StorageError};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

const VERSION_MARKER: &str = "Version";

/// Constructor of a registered migration
pub type MigrationFactory = fn() -> Box<dyn Migration>;

fn instantiate<M: Migration + Default + 'static>() -> Box<dyn Migration> {
    Box::new(M::default())
}

/// Finds migrations in a directory and instantiates them from a registry
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    directory: PathBuf,
    registry: HashMap<String, MigrationFactory>,
}

impl MigrationLoader {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            registry: HashMap::new(),
        }
    }

    /// Register `M` under its identifier, e.g. `"Version201912201932"`
    #[must_use]
    pub fn register<M: Migration + Default + 'static>(self, identifier: impl Into<String>) -> Self {
        self.register_factory(identifier, instantiate::<M>)
    }

    /// Register an explicit factory
    #[must_use]
    pub fn register_factory(
        mut self,
        identifier: impl Into<String>,
        factory: MigrationFactory,
    ) -> Self {
        self.registry.insert(identifier.into(), factory);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Discover migrations, ordered by version
    ///
    /// A later file with the same version replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be read, or
    /// [`StorageError::Migration`] when a discovered file has no registered
    /// migration.
    pub async fn load(&self) -> Result<BTreeMap<String, Box<dyn Migration>>> {
        let mut migrations = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let path = entry.path();
            let file_name = entry.file_name();
            if !file_name.to_string_lossy().contains(VERSION_MARKER) {
                continue;
            }

            let identifier = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let version = identifier
                .get(VERSION_MARKER.len()..)
                .filter(|version| !version.is_empty())
                .ok_or_else(|| {
                    StorageError::migration(format!(
                        "Can't extract a version from \"{}\"",
                        path.display()
                    ))
                })?
                .to_string();

            let factory = self.registry.get(&identifier).ok_or_else(|| {
                StorageError::migration(format!(
                    "\"{}\" doesn't provide a registered migration (expected \"{}\")",
                    path.display(),
                    identifier
                ))
            })?;

            debug!(version = %version, path = %path.display(), "migration discovered");
            migrations.insert(version, factory());
        }

        Ok(migrations)
    }
}
