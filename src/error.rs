use thiserror::Error;

/// Failure outcomes of the session protocol, the run file, and the stores
/// behind them. The CLI layer decides how these end the process.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The caller broke the start/step/stop contract.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Submitted values are out of range or malformed.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A run file is malformed or revisits a closed topic.
    #[error("run file integrity error: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
