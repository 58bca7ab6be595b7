//! Forward-only result cursors
//!
//! A [`ResultSet`] wraps exactly one backend result. Network backends stream
//! rows through a [`RowStream`]; the embedded backend buffers every row at
//! execution time; statements without a result set only carry the number of
//! affected rows.

use super::error::Result;
use super::value::{Row, SqlValue};
use async_trait::async_trait;
use std::collections::VecDeque;

/// Source of streamed rows
#[async_trait]
pub trait RowStream: Send {
    /// Pull the next row, `None` at the end of the stream
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ResultSetIterationFailed`](super::StorageError::ResultSetIterationFailed)
    /// when the driver fails to deliver the row.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

enum Source {
    Cursor(Box<dyn RowStream>),
    Buffered {
        rows: VecDeque<Row>,
        affected_rows: u64,
        last_insert_id: Option<String>,
    },
    CommandResult {
        affected_rows: u64,
    },
}

/// Result of one executed statement
pub struct ResultSet {
    source: Source,
    current: Option<Row>,
    advanced: bool,
}

impl ResultSet {
    /// Result backed by a row stream
    pub fn streaming(rows: Box<dyn RowStream>) -> Self {
        Self::from_source(Source::Cursor(rows))
    }

    /// Result whose rows were fetched eagerly
    pub fn buffered(
        rows: impl Into<VecDeque<Row>>,
        affected_rows: u64,
        last_insert_id: Option<String>,
    ) -> Self {
        Self::from_source(Source::Buffered {
            rows: rows.into(),
            affected_rows,
            last_insert_id,
        })
    }

    /// Result of a statement that produces no rows
    pub fn command(affected_rows: u64) -> Self {
        Self::from_source(Source::CommandResult { affected_rows })
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            current: None,
            advanced: false,
        }
    }

    /// Move to the next row
    ///
    /// Returns `false` once the rows are exhausted; command results never have
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ResultSetIterationFailed`](super::StorageError::ResultSetIterationFailed)
    /// if the underlying cursor fails.
    pub async fn advance(&mut self) -> Result<bool> {
        self.advanced = true;
        self.current = match &mut self.source {
            Source::Cursor(rows) => rows.next_row().await?,
            Source::Buffered { rows, .. } => rows.pop_front(),
            Source::CommandResult { .. } => None,
        };
        Ok(self.current.is_some())
    }

    /// Row fetched by the last successful [`advance`](Self::advance)
    ///
    /// Rows without columns are reported as missing.
    pub fn current(&self) -> Option<&Row> {
        self.current.as_ref().filter(|row| !row.is_empty())
    }

    /// Take ownership of the current row
    pub fn take_current(&mut self) -> Option<Row> {
        self.current.take().filter(|row| !row.is_empty())
    }

    /// Identifier generated by the statement
    ///
    /// Streamed results read the first column of the current row, advancing
    /// once if that has not happened yet (`INSERT ... RETURNING id`). The
    /// embedded backend reports the connection's last inserted rowid. The
    /// sequence name is accepted for interface parity and not consulted.
    ///
    /// # Errors
    ///
    /// Propagates iteration failures from the implicit advance.
    pub async fn last_insert_id(&mut self, _sequence: Option<&str>) -> Result<Option<String>> {
        match &self.source {
            Source::Buffered { last_insert_id, .. } => return Ok(last_insert_id.clone()),
            Source::CommandResult { .. } => return Ok(None),
            Source::Cursor(_) => {}
        }

        if !self.advanced {
            self.advance().await?;
        }
        Ok(self
            .current()
            .and_then(Row::first)
            .and_then(SqlValue::to_text))
    }

    /// Rows changed by an INSERT, UPDATE or DELETE
    pub fn affected_rows(&self) -> u64 {
        match &self.source {
            Source::Cursor(_) => 0,
            Source::Buffered { affected_rows, .. } | Source::CommandResult { affected_rows } => {
                *affected_rows
            }
        }
    }

    /// True when the statement produced a row set rather than a command outcome
    pub fn has_rows(&self) -> bool {
        !matches!(self.source, Source::CommandResult { .. })
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.source {
            Source::Cursor(_) => "Cursor",
            Source::Buffered { .. } => "Buffered",
            Source::CommandResult { .. } => "CommandResult",
        };
        f.debug_struct("ResultSet")
            .field("kind", &kind)
            .field("affected_rows", &self.affected_rows())
            .field("current", &self.current)
            .finish()
    }
}
