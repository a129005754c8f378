use bridge_traits::BridgeError;
use thiserror::Error;

/// Failure reported by an operation itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wrap any error, keeping its display text.
    pub fn from_error(error: impl std::error::Error) -> Self {
        Self::new(error.to_string())
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Error, Debug, Clone)]
pub enum OfflineError {
    /// The device is offline; the operation was queued and will run later.
    #[error("Offline: operation {key} queued and will execute when connectivity returns")]
    Deferred { key: String },

    #[error("Operation failed: {0}")]
    Operation(#[from] OperationError),

    #[error("Operation {key} gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        last_error: OperationError,
    },

    #[error("No factory registered for operation kind {0}")]
    UnknownOperationKind(String),

    #[error("Operation store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network monitor error: {0}")]
    Network(String),
}

impl OfflineError {
    /// Whether this is the "queued, will execute later" signal.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}

impl From<BridgeError> for OfflineError {
    fn from(error: BridgeError) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<core_runtime::Error> for OfflineError {
    fn from(error: core_runtime::Error) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<sqlx::Error> for OfflineError {
    fn from(error: sqlx::Error) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<serde_json::Error> for OfflineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OfflineError>;
