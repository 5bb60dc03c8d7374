use thiserror::Error;

#[derive(Error, Debug)]
pub enum MurmurError {
    /// Microphone access was refused.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Any failed call to the identity/persistence/realtime provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Rejected client-side before any remote call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A response for a conversation that is no longer active.
    #[error("Stale response for conversation {expected}, active is {active}")]
    StaleResponse { expected: String, active: String },

    #[error("No authenticated user")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Audio capture error: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MurmurError {
    /// Stale responses are discarded without surfacing anything to the user.
    pub fn is_stale(&self) -> bool {
        matches!(self, MurmurError::StaleResponse { .. })
    }
}

pub type Result<T> = std::result::Result<T, MurmurError>;
