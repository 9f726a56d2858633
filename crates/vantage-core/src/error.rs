use thiserror::Error;

/// Result type alias for vantage operations
pub type Result<T> = std::result::Result<T, VaError>;

/// Errors that can occur while setting up or running the validation engine
#[derive(Error, Debug)]
pub enum VaError {
    /// Configuration is invalid or unsatisfiable
    #[error("configuration error: {0}")]
    Config(String),

    /// A wire payload could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// IO error (config file, exception list)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaError {
    /// Returns true if the error must prevent the service from starting
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Io(_))
    }
}
