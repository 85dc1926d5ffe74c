//! Error types for schema synchronization.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while introspecting, diffing or synchronizing.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A catalog query failed or returned metadata that could not be parsed.
    #[error("Failed to introspect table '{table}': {message}")]
    Introspection {
        /// Table being introspected.
        table: String,
        /// What went wrong.
        message: String,
    },

    /// A passive table has a non-empty diff.
    #[error(
        "Table '{table}' is passive and cannot be altered \
         (columns: [{}], indexes: [{}], foreign keys: [{}])",
        .columns.join(", "),
        .indexes.join(", "),
        .foreign_keys.join(", ")
    )]
    DiffConflict {
        /// Passive table name.
        table: String,
        /// Added, dropped or altered columns.
        columns: Vec<String>,
        /// Added, dropped or altered indexes.
        indexes: Vec<String>,
        /// Added, dropped or altered foreign keys (by owning column).
        foreign_keys: Vec<String>,
    },

    /// A DDL statement failed; the owning connection group was rolled back.
    #[error("Failed to execute DDL on '{database}' for table '{table}': {source}\n  {sql}")]
    DdlExecution {
        /// Connection group.
        database: String,
        /// Table the statement belongs to.
        table: String,
        /// The failing statement.
        sql: String,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },

    /// The dialect cannot perform the requested operation.
    #[error("Operation '{operation}' is not supported by the {dialect} dialect")]
    UnsupportedOperation {
        /// Description of the operation.
        operation: String,
        /// Dialect name.
        dialect: &'static str,
    },

    /// The declared schema is inconsistent (unknown column, duplicate rename...).
    #[error("Invalid schema declaration for table '{table}': {message}")]
    InvalidSchema {
        /// Table being declared.
        table: String,
        /// What is wrong with it.
        message: String,
    },

    /// A table references a database that is not registered.
    #[error("Unknown database '{0}'")]
    UnknownDatabase(String),

    /// The connection URL scheme does not map to a supported dialect.
    #[error("Unsupported database URL: {0}")]
    UnsupportedUrl(String),

    /// Invalid configuration file.
    #[error("Invalid configuration in '{path}': {message}")]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Database error outside of DDL execution (connect, begin, commit).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading configuration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// At least one connection group failed.
    #[error("{0}")]
    Synchronization(SyncFailure),
}

impl SyncError {
    /// Shorthand for an [`SyncError::InvalidSchema`] error.
    pub(crate) fn invalid_schema(table: &str, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for an [`SyncError::Introspection`] error.
    pub(crate) fn introspection(table: &str, message: impl fmt::Display) -> Self {
        Self::Introspection {
            table: table.to_string(),
            message: message.to_string(),
        }
    }
}

/// Outcome of a run in which at least one connection group failed.
///
/// Groups listed in `committed` stay committed: each group is an
/// independent transaction.
#[derive(Debug)]
pub struct SyncFailure {
    /// Groups that were committed.
    pub committed: Vec<String>,
    /// Groups that were rolled back, with the first error each raised.
    pub failed: Vec<(String, SyncError)>,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Synchronization failed for {} of {} database(s)",
            self.failed.len(),
            self.failed.len() + self.committed.len()
        )?;
        if !self.committed.is_empty() {
            write!(f, " (committed: {})", self.committed.join(", "))?;
        }
        for (database, error) in &self.failed {
            write!(f, "\n  - {database}: {error}")?;
        }
        Ok(())
    }
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
