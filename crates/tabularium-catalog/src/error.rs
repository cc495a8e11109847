//! Error types for catalog operations.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A candidate entry failed validation.
    #[error("invalid entry: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The persisted catalog does not match the fixed column schema.
    #[error("catalog schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A query referenced a column that is not part of the schema.
    #[error("unknown catalog column: {column}")]
    UnknownColumn {
        /// The offending column name.
        column: String,
    },

    /// A query was structurally unusable in the requested match mode.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A specification or filter tree was structurally invalid.
    #[error("malformed specification: {message}")]
    MalformedSpec {
        /// Description of the problem.
        message: String,
    },

    /// Two leaves of one composition resolved to the same path key.
    #[error("duplicate path key: {key}")]
    DuplicatePathKey {
        /// The colliding key, rendered with `/` separators.
        key: String,
    },

    /// The requested record was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// A core-layer failure (storage, serialization).
    #[error(transparent)]
    Core(#[from] tabularium_core::Error),
}

impl CatalogError {
    /// Creates a validation error with the given message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a schema-mismatch error with the given message.
    #[must_use]
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates a malformed-specification error with the given message.
    #[must_use]
    pub fn malformed_spec(message: impl Into<String>) -> Self {
        Self::MalformedSpec {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Core(err.into())
    }
}
