//! Transactional migration runner
//!
//! A run happens in one transaction: the bookkeeping table is created if
//! needed, every migration whose version can be recorded has its statements
//! executed, and any failure rolls the whole run back.

use super::{Migration, MigrationDirection, MigrationLoader};
use crate::core::error::Result;
use crate::core::executor::{DatabaseAdapter, QueryExecutor, Transactional};
use crate::core::value::SqlValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const CREATE_BOOKKEEPING_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS migration ( version varchar NOT NULL )";

/// Inserts the version unless it is already recorded; affects 0 rows then.
const RECORD_VERSION: &str = "INSERT INTO migration (version) \
     SELECT ? WHERE NOT EXISTS (SELECT 1 FROM migration WHERE version = ?)";

/// Applies discovered migrations through an adapter
pub struct MigrationProcessor<A: DatabaseAdapter + ?Sized> {
    adapter: Arc<A>,
    loader: MigrationLoader,
}

impl<A: DatabaseAdapter + ?Sized> MigrationProcessor<A> {
    pub fn new(adapter: Arc<A>, loader: MigrationLoader) -> Self {
        Self { adapter, loader }
    }

    /// Run the `up` hooks of migrations not yet recorded
    ///
    /// Returns the number of executed statements.
    ///
    /// # Errors
    ///
    /// Returns the loader error, or the first failing statement's error after
    /// the transaction is rolled back.
    pub async fn up(&self) -> Result<usize> {
        self.process(MigrationDirection::Up).await
    }

    /// Run the `down` hooks of migrations not yet recorded
    ///
    /// Returns the number of executed statements.
    ///
    /// # Errors
    ///
    /// Same as [`up`](Self::up).
    pub async fn down(&self) -> Result<usize> {
        self.process(MigrationDirection::Down).await
    }

    async fn process(&self, direction: MigrationDirection) -> Result<usize> {
        let migrations = self.loader.load().await?;
        info!(
            %direction,
            discovered = migrations.len(),
            directory = %self.loader.directory().display(),
            "running migrations"
        );

        let executed = self
            .adapter
            .transactional(move |executor| {
                Box::pin(async move { run(executor, migrations, direction).await })
            })
            .await?;

        info!(%direction, executed, "migrations completed");
        Ok(executed)
    }
}

async fn run(
    executor: &dyn QueryExecutor,
    migrations: BTreeMap<String, Box<dyn Migration>>,
    direction: MigrationDirection,
) -> Result<usize> {
    executor.execute(CREATE_BOOKKEEPING_TABLE, &[]).await?;

    let mut executed = 0;
    for (version, migration) in migrations {
        let version_param = SqlValue::from(version.as_str());
        let recorded = executor
            .execute(RECORD_VERSION, &[version_param.clone(), version_param])
            .await?;

        if recorded.affected_rows() == 0 {
            debug!(%version, "migration already applied, skipping");
            continue;
        }

        for (sql, params) in migration.apply(direction) {
            executor.execute(&sql, &params).await?;
            executed += 1;
        }
        debug!(%version, %direction, "migration applied");
    }

    Ok(executed)
}
