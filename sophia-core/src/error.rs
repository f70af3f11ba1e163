//! Error types for the SOPHIA core library.

use thiserror::Error;

/// Top-level error type for all SOPHIA operations.
///
/// The first four variants form the caller-facing taxonomy and map to
/// distinct HTTP statuses; the rest are internal failures.
#[derive(Error, Debug)]
pub enum SophiaError {
    /// The request was malformed (empty name, non-finite impact, unmet requirement).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A player, scenario, choice, enemy, item or fallacy does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of thing was looked up.
        kind: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// The action does not fit the current state (concluded encounter,
    /// wrong syllogism, full inventory).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Another action on the same player held the lock for too long.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration or content error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SophiaError {
    /// Shorthand for a [`SophiaError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Serialization(_) => "serialization_error",
            Self::Database(_) => "database_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, SophiaError>;
