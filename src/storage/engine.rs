//! Boundary of the external storage engine.
//!
//! A session only ever talks to these traits. [`MemoryEngine`](super::MemoryEngine)
//! is the bundled implementation; any other versioned, transactional
//! key-value engine can be plugged in by implementing them.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::core::{Key, Record};
use crate::schema::StoreParameters;
use crate::transaction::{TransactionMode, TransactionPhase};

/// Errors reported by the engine, named after the engine's own error names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("NotFoundError: {0}")]
    NotFound(String),

    #[error("ConstraintError: {0}")]
    Constraint(String),

    #[error("DataError: {0}")]
    Data(String),

    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    #[error("InvalidAccessError: {0}")]
    InvalidAccess(String),

    #[error("VersionError: {0}")]
    Version(String),

    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("ReadOnlyError: {0}")]
    ReadOnly(String),

    #[error("AbortError: {0}")]
    Abort(String),

    #[error("UnknownError: {0}")]
    Unknown(String),
}

impl EngineError {
    /// The engine's message without the error name.
    pub fn message(&self) -> &str {
        match self {
            EngineError::NotFound(msg)
            | EngineError::Constraint(msg)
            | EngineError::Data(msg)
            | EngineError::InvalidState(msg)
            | EngineError::InvalidAccess(msg)
            | EngineError::Version(msg)
            | EngineError::Syntax(msg)
            | EngineError::ReadOnly(msg)
            | EngineError::Abort(msg)
            | EngineError::Unknown(msg) => msg,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Name and stored schema version of a database known to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub version: u64,
}

#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Open `name` at `version`.
    ///
    /// When `version` is above the stored version, `upgrade` runs exactly once
    /// before the connection is handed out. If it fails, the stored schema is
    /// left as it was and the open fails with the upgrade's error.
    async fn open(
        &self,
        name: &str,
        version: u64,
        upgrade: &dyn UpgradeHandler,
    ) -> EngineResult<Box<dyn EngineConnection>>;

    async fn delete_database(&self, name: &str) -> EngineResult<()>;

    async fn databases(&self) -> Vec<DatabaseInfo>;
}

/// Callback invoked when an open request raises the schema version.
pub trait UpgradeHandler: Send + Sync {
    fn upgrade(&self, db: &mut dyn UpgradeContext, old_version: u64, new_version: u64) -> EngineResult<()>;
}

/// Schema operations available only while an upgrade runs.
pub trait UpgradeContext {
    fn has_store(&self, name: &str) -> bool;

    fn store_names(&self) -> Vec<String>;

    fn create_store(&mut self, name: &str, parameters: &StoreParameters) -> EngineResult<()>;
}

/// A live connection to one database.
pub trait EngineConnection: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u64;

    fn has_store(&self, name: &str) -> bool;

    fn store_names(&self) -> Vec<String>;

    /// Start a transaction over a single store. Fails immediately when the
    /// store is unknown or the connection is closed.
    fn transaction(&self, store: &str, mode: TransactionMode) -> EngineResult<Box<dyn EngineTransaction>>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

pub trait EngineTransaction: Send + Sync {
    fn mode(&self) -> TransactionMode;

    fn store(&self, name: &str) -> EngineResult<Arc<dyn ObjectStore>>;

    /// Watch the transaction's phase. Failure and abort are reported here
    /// even when no request observes them.
    fn subscribe(&self) -> watch::Receiver<TransactionPhase>;

    fn abort(&self);
}

/// A store handle bound to one transaction. Every method is one request.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &str;

    fn parameters(&self) -> &StoreParameters;

    /// `Ok(None)` when no record has this key.
    async fn get(&self, key: Key) -> EngineResult<Option<Record>>;

    async fn get_all(&self) -> EngineResult<Vec<Record>>;

    /// Insert or replace a record, returning its key. `key` is only valid for
    /// stores with out-of-line keys.
    async fn put(&self, record: Record, key: Option<Key>) -> EngineResult<Key>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: Key) -> EngineResult<()>;

    async fn clear(&self) -> EngineResult<()>;

    async fn count(&self) -> EngineResult<usize>;
}
