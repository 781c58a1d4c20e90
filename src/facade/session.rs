use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use crate::core::{DbError, Key, Record, Result};
use crate::schema::{StoreDefinition, ValidatedSchema};
use crate::storage::{EngineConnection, EngineResult, MemoryEngine, StorageEngine, UpgradeContext, UpgradeHandler};
use crate::transaction::{TransactionMode, open_store};

/// Lifecycle of a session. The connection exists only while `Open`.
pub enum SessionState {
    Uninitialized,
    Open(Box<dyn EngineConnection>),
    Closed,
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "UNINITIALIZED",
            SessionState::Open(_) => "OPEN",
            SessionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Open(connection) => f
                .debug_struct("Open")
                .field("database", &connection.name())
                .field("version", &connection.version())
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Creates the declared stores the live schema is missing.
struct SchemaUpgrade<'a> {
    stores: &'a [StoreDefinition],
}

impl UpgradeHandler for SchemaUpgrade<'_> {
    fn upgrade(&self, db: &mut dyn UpgradeContext, old_version: u64, new_version: u64) -> EngineResult<()> {
        for store in self.stores {
            if db.has_store(&store.name) {
                continue;
            }
            db.create_store(&store.name, &store.parameters())?;
            info!(store = %store.name, key_path = %store.key_path, auto_increment = store.auto_increment, "store created");
        }
        debug!(old_version, new_version, "schema upgraded");
        Ok(())
    }
}

/// A handle to one named, versioned database.
///
/// Constructed from a [`SessionConfig`], which is validated before anything
/// else happens. [`init`](Session::init) opens the database, creating any
/// declared store the stored schema lacks; every CRUD call then runs in its
/// own single-store transaction.
///
/// ```
/// use reign::{MemoryEngine, Session, SessionConfig};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let config = SessionConfig::new("Shop", ["Orders", "Customers"], 1);
/// let mut session = Session::with_engine(config, Arc::new(MemoryEngine::new()))?;
/// session.init().await?;
///
/// let key = session.update("Orders", json!({ "item": "pen" })).await?;
/// assert!(session.is_exist("Orders", key).await?);
/// # Ok::<(), reign::DbError>(())
/// # }).unwrap();
/// ```
pub struct Session {
    schema: ValidatedSchema,
    engine: Arc<dyn StorageEngine>,
    state: SessionState,
}

impl Session {
    /// Validate `config` and bind the session to the process-wide engine.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_engine(config, MemoryEngine::global())
    }

    pub fn with_engine(config: SessionConfig, engine: Arc<dyn StorageEngine>) -> Result<Self> {
        let schema = config.verify()?;
        debug!(database = %schema.database_name, version = schema.version, stores = ?schema.store_names(), "session configured");

        Ok(Self {
            schema,
            engine,
            state: SessionState::Uninitialized,
        })
    }

    /// Open the database.
    ///
    /// Does nothing when the session is already open. Engine errors are
    /// returned unchanged and leave the state as it was.
    pub async fn init(&mut self) -> Result<()> {
        if self.state.is_open() {
            debug!(database = %self.schema.database_name, "session already open");
            return Ok(());
        }

        let upgrade = SchemaUpgrade {
            stores: &self.schema.stores,
        };
        let connection = self
            .engine
            .open(&self.schema.database_name, self.schema.version, &upgrade)
            .await
            .map_err(|err| {
                warn!(database = %self.schema.database_name, version = self.schema.version, error = %err, "open failed");
                DbError::from(err)
            })?;

        info!(database = %connection.name(), version = connection.version(), "session opened");
        self.state = SessionState::Open(connection);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Open(connection) => {
                connection.close();
                info!(database = %self.schema.database_name, "session closed");
                Ok(())
            }
            previous => {
                self.state = previous;
                Err(DbError::NotOpen)
            }
        }
    }

    /// Insert or replace a record, resolving with its key.
    pub async fn update(&self, store: &str, record: Record) -> Result<Key> {
        let scoped = open_store(self.connection(), store, TransactionMode::ReadWrite)?;
        let handle = scoped.handle();
        scoped.settle(handle.put(record, None)).await
    }

    /// Insert or replace a record under an explicit key. Only valid for
    /// stores with out-of-line keys.
    pub async fn update_with_key(&self, store: &str, record: Record, key: impl Into<Key>) -> Result<Key> {
        let scoped = open_store(self.connection(), store, TransactionMode::ReadWrite)?;
        let handle = scoped.handle();
        scoped.settle(handle.put(record, Some(key.into()))).await
    }

    /// Every record of `store`, in key order.
    pub async fn read(&self, store: &str) -> Result<Vec<Record>> {
        let scoped = open_store(self.connection(), store, TransactionMode::ReadOnly)?;
        let handle = scoped.handle();
        scoped.settle(handle.get_all()).await
    }

    /// `Ok(None)` when no record has this key.
    pub async fn get(&self, store: &str, key: impl Into<Key>) -> Result<Option<Record>> {
        let scoped = open_store(self.connection(), store, TransactionMode::ReadOnly)?;
        let handle = scoped.handle();
        scoped.settle(handle.get(key.into())).await
    }

    pub async fn delete(&self, store: &str, key: impl Into<Key>) -> Result<()> {
        let scoped = open_store(self.connection(), store, TransactionMode::ReadWrite)?;
        let handle = scoped.handle();
        scoped.settle(handle.delete(key.into())).await
    }

    pub async fn clear(&self, store: &str) -> Result<()> {
        let scoped = open_store(self.connection(), store, TransactionMode::ReadWrite)?;
        let handle = scoped.handle();
        scoped.settle(handle.clear()).await
    }

    /// Whether a record exists under `key`. An absent key is `Ok(false)`.
    pub async fn is_exist(&self, store: &str, key: impl Into<Key>) -> Result<bool> {
        Ok(self.get(store, key).await?.is_some())
    }

    pub async fn count(&self, store: &str) -> Result<usize> {
        let scoped = open_store(self.connection(), store, TransactionMode::ReadOnly)?;
        let handle = scoped.handle();
        scoped.settle(handle.count()).await
    }

    pub async fn put_as<T: Serialize>(&self, store: &str, value: &T) -> Result<Key> {
        let record = serde_json::to_value(value)?;
        self.update(store, record).await
    }

    pub async fn get_as<T: DeserializeOwned>(&self, store: &str, key: impl Into<Key>) -> Result<Option<T>> {
        match self.get(store, key).await? {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }

    pub async fn read_as<T: DeserializeOwned>(&self, store: &str) -> Result<Vec<T>> {
        self.read(store)
            .await?
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(DbError::from))
            .collect()
    }

    pub fn database_name(&self) -> &str {
        &self.schema.database_name
    }

    pub fn version(&self) -> u64 {
        self.schema.version
    }

    pub fn schema(&self) -> &ValidatedSchema {
        &self.schema
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Stores present in the open database, which may include stores created
    /// by other sessions.
    pub fn store_names(&self) -> Result<Vec<String>> {
        self.connection()
            .map(|connection| connection.store_names())
            .ok_or(DbError::Uninitialized)
    }

    fn connection(&self) -> Option<&dyn EngineConnection> {
        match &self.state {
            SessionState::Open(connection) => Some(connection.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("schema", &self.schema)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let SessionState::Open(connection) = &self.state {
            connection.close();
        }
    }
}
