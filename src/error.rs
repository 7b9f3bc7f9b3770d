//! Error types for pulse.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// Local file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Local storage write failed where the caller needs to know.
    #[error("storage error: {0}")]
    Storage(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("remote error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// Sign-in flow failed or no session is available.
    #[error("auth error: {0}")]
    Auth(String),

    /// Unknown template slug.
    #[error("template not found: {0}")]
    Template(String),

    /// A habit or reminder lookup by name/id failed.
    #[error("{0}")]
    NotFound(String),

    /// Input rejected by validation.
    #[error("{0}")]
    Rejected(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PulseError>;
