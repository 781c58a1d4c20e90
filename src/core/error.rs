use thiserror::Error;

use crate::storage::EngineError;

/// Detail of a rejected constructor input.
///
/// Every variant is raised synchronously by the parameter validator, before
/// the storage engine is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Database name is required and must be a non-empty string")]
    InvalidDatabaseName,

    #[error("At least one store must be declared")]
    NoStores,

    #[error("Store at position {index} must have a non-empty, printable name")]
    InvalidStoreName { index: usize },

    #[error("Store '{store}' has an invalid key path: {reason}")]
    InvalidKeyPath { store: String, reason: String },

    #[error("Store '{store}' has a non-boolean autoIncrement flag")]
    InvalidAutoIncrement { store: String },

    #[error("Store '{store}' options must be a plain object")]
    InvalidOptions { store: String },

    #[error("Version is required and must be a positive integer, got {0}")]
    InvalidVersion(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid store definitions: {0}")]
    StoreDefinitionShape(String),

    #[error("The session must be opened before any operation. Call init() first.")]
    Uninitialized,

    #[error("No active connection to close")]
    NotOpen,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to create a transaction: {0}")]
    TransactionCreation(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    /// The engine error carried by this failure, if it came straight from a request.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
