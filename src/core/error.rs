//! Error types for the storage layer
//!
//! Every backend failure is normalized into [`StorageError`] before it reaches
//! the caller. The first five variants form the adapter-level taxonomy; the
//! remaining ones are raised by the helper functions, the finders and the
//! migration runner.

/// Boxed error used as the `source` of normalized failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The DSN is malformed or the backend cannot be set up with it
    #[error("Invalid configuration options: {message}")]
    InvalidConfigurationOptions {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A backend connection could not be established or was lost
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A write violated a unique or foreign key constraint
    #[error("Unique constraint violation check failed: {message}")]
    UniqueConstraintViolationCheckFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Any other failure while executing a statement
    #[error("Storage interacting failed: {message}")]
    StorageInteractingFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Reading the next row of a result failed
    #[error("Result set iteration failed: {message}")]
    ResultSetIterationFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A single-row query returned several rows
    #[error(
        "A single record was requested, but the result of the query execution contains several (\"{count}\")"
    )]
    OneResultExpected { count: usize },

    /// A parameter cannot be represented as a scalar SQL value
    #[error("Incorrect parameter cast: {0}")]
    IncorrectParameterCast(String),

    /// Migration discovery or registration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (cache payloads, object casting)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Create an invalid configuration error
    pub fn invalid_configuration<S: Into<String>>(msg: S) -> Self {
        StorageError::InvalidConfigurationOptions {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection failed error
    pub fn connection_failed<S: Into<String>>(msg: S) -> Self {
        StorageError::ConnectionFailed {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source error
    pub fn connection_failed_with_source<S: Into<String>>(msg: S, source: BoxError) -> Self {
        StorageError::ConnectionFailed {
            message: msg.into(),
            source: Some(source),
        }
    }

    /// Create a constraint violation error
    pub fn unique_constraint_violation<S: Into<String>>(msg: S) -> Self {
        StorageError::UniqueConstraintViolationCheckFailed {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a generic interaction error
    pub fn storage_interacting<S: Into<String>>(msg: S) -> Self {
        StorageError::StorageInteractingFailed {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a result iteration error wrapping the driver failure
    pub fn result_set_iteration<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::ResultSetIterationFailed {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Create an incorrect parameter cast error
    pub fn incorrect_parameter_cast<S: Into<String>>(msg: S) -> Self {
        StorageError::IncorrectParameterCast(msg.into())
    }

    /// Create a new migration error
    pub fn migration<S: Into<String>>(msg: S) -> Self {
        StorageError::Migration(msg.into())
    }

    /// Attach a source error to one of the adapter-level variants.
    ///
    /// Other variants are returned unchanged.
    pub fn with_source(mut self, error: BoxError) -> Self {
        match &mut self {
            StorageError::InvalidConfigurationOptions { source, .. }
            | StorageError::ConnectionFailed { source, .. }
            | StorageError::UniqueConstraintViolationCheckFailed { source, .. }
            | StorageError::StorageInteractingFailed { source, .. }
            | StorageError::ResultSetIterationFailed { source, .. } => *source = Some(error),
            _ => {}
        }
        self
    }

    /// True for failures caused by constraint violations
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StorageError::UniqueConstraintViolationCheckFailed { .. })
    }
}
