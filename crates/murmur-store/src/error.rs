use thiserror::Error;

use murmur_shared::MurmurError;

/// Errors produced by the local provider.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A row violated a constraint the provider enforces.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Database lock poisoned")]
    Poisoned,
}

impl From<StoreError> for MurmurError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => MurmurError::NotFound("record".into()),
            StoreError::Constraint(reason) => MurmurError::Validation(reason),
            other => MurmurError::Backend(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
