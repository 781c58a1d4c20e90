use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, watch};
use tracing::{debug, info};

use super::engine::{
    DatabaseInfo, EngineConnection, EngineError, EngineResult, EngineTransaction, ObjectStore, StorageEngine,
    UpgradeContext, UpgradeHandler,
};
use super::object_store::{ObjectStoreData, check_parameters};
use crate::core::{Key, Record};
use crate::schema::StoreParameters;
use crate::transaction::{TransactionId, TransactionMode, TransactionPhase};

// Global engine shared by every session that does not bring its own.
lazy_static! {
    static ref GLOBAL_ENGINE: Arc<MemoryEngine> = Arc::new(MemoryEngine::new());
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type StoreCell = Arc<RwLock<ObjectStoreData>>;

/// Store catalog of one database version.
///
/// Copy-on-write: an upgrade builds a new catalog, while open connections
/// keep the one they were opened with. Record data is shared between them.
#[derive(Clone, Default)]
struct Catalog {
    stores: Arc<HashMap<String, (StoreParameters, StoreCell)>>,
}

impl Catalog {
    fn has_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    fn store(&self, name: &str) -> Option<(StoreParameters, StoreCell)> {
        self.stores.get(name).cloned()
    }

    fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.keys().cloned().collect();
        names.sort();
        names
    }

    fn with_store(self, name: &str, parameters: &StoreParameters) -> EngineResult<Self> {
        if self.stores.contains_key(name) {
            return Err(EngineError::Constraint(format!(
                "An object store with the name '{}' already exists",
                name
            )));
        }
        check_parameters(parameters)?;

        let mut stores = (*self.stores).clone();
        let cell = Arc::new(RwLock::new(ObjectStoreData::new(parameters.clone())));
        stores.insert(name.to_string(), (parameters.clone(), cell));
        Ok(Self {
            stores: Arc::new(stores),
        })
    }
}

#[derive(Clone)]
struct DatabaseState {
    version: u64,
    catalog: Catalog,
}

/// In-process storage engine.
///
/// Databases live for as long as the engine does. Use [`MemoryEngine::global`]
/// to share databases across sessions, or [`MemoryEngine::new`] for an
/// isolated instance.
pub struct MemoryEngine {
    databases: Mutex<HashMap<String, DatabaseState>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> Arc<MemoryEngine> {
        Arc::clone(&GLOBAL_ENGINE)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema changes staged while an upgrade callback runs.
struct StagedUpgrade {
    catalog: Catalog,
    created: Vec<String>,
}

impl UpgradeContext for StagedUpgrade {
    fn has_store(&self, name: &str) -> bool {
        self.catalog.has_store(name)
    }

    fn store_names(&self) -> Vec<String> {
        self.catalog.store_names()
    }

    fn create_store(&mut self, name: &str, parameters: &StoreParameters) -> EngineResult<()> {
        self.catalog = self.catalog.clone().with_store(name, parameters)?;
        self.created.push(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn open(
        &self,
        name: &str,
        version: u64,
        upgrade: &dyn UpgradeHandler,
    ) -> EngineResult<Box<dyn EngineConnection>> {
        if version == 0 {
            return Err(EngineError::InvalidAccess("The version must be a positive integer".into()));
        }

        let mut databases = self.databases.lock().await;
        let current = databases.get(name).cloned().unwrap_or(DatabaseState {
            version: 0,
            catalog: Catalog::default(),
        });

        if version < current.version {
            return Err(EngineError::Version(format!(
                "The requested version ({}) is less than the existing version ({})",
                version, current.version
            )));
        }

        let state = if version > current.version {
            let mut staged = StagedUpgrade {
                catalog: current.catalog.clone(),
                created: Vec::new(),
            };
            upgrade.upgrade(&mut staged, current.version, version)?;

            debug!(
                database = %name,
                old_version = current.version,
                new_version = version,
                created = ?staged.created,
                "upgrade committed"
            );
            let state = DatabaseState {
                version,
                catalog: staged.catalog,
            };
            databases.insert(name.to_string(), state.clone());
            state
        } else {
            current
        };

        let connection = MemoryConnection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            version: state.version,
            catalog: state.catalog,
            closed: AtomicBool::new(false),
        };
        debug!(database = %name, connection = connection.id, version, "connection opened");
        Ok(Box::new(connection))
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        if self.databases.lock().await.remove(name).is_some() {
            info!(database = %name, "database deleted");
        }
        Ok(())
    }

    async fn databases(&self) -> Vec<DatabaseInfo> {
        let databases = self.databases.lock().await;
        let mut infos: Vec<DatabaseInfo> = databases
            .iter()
            .map(|(name, state)| DatabaseInfo {
                name: name.clone(),
                version: state.version,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

pub struct MemoryConnection {
    id: u64,
    name: String,
    version: u64,
    catalog: Catalog,
    closed: AtomicBool,
}

impl EngineConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn has_store(&self, name: &str) -> bool {
        self.catalog.has_store(name)
    }

    fn store_names(&self) -> Vec<String> {
        self.catalog.store_names()
    }

    fn transaction(&self, store: &str, mode: TransactionMode) -> EngineResult<Box<dyn EngineTransaction>> {
        if self.is_closed() {
            return Err(EngineError::InvalidState("The database connection is closing.".into()));
        }

        let (parameters, cell) = self.catalog.store(store).ok_or_else(|| {
            EngineError::NotFound(format!("No objectStore named {} in this database", store))
        })?;

        let (phase, _) = watch::channel(TransactionPhase::Active);
        Ok(Box::new(MemoryTransaction {
            id: TransactionId::new(),
            mode,
            handle: Arc::new(MemoryObjectStore {
                name: store.to_string(),
                parameters,
                mode,
                cell,
                phase: Arc::new(phase),
            }),
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(database = %self.name, connection = self.id, "connection closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MemoryTransaction {
    id: TransactionId,
    mode: TransactionMode,
    handle: Arc<MemoryObjectStore>,
}

impl EngineTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn store(&self, name: &str) -> EngineResult<Arc<dyn ObjectStore>> {
        if name != self.handle.name {
            return Err(EngineError::NotFound(format!(
                "The object store '{}' is not in the scope of {}",
                name, self.id
            )));
        }
        Ok(self.handle.clone())
    }

    fn subscribe(&self) -> watch::Receiver<TransactionPhase> {
        self.handle.phase.subscribe()
    }

    fn abort(&self) {
        if self.handle.finish(TransactionPhase::Aborted("The transaction was aborted".into())) {
            debug!(transaction = %self.id, store = %self.handle.name, "transaction aborted");
        }
    }
}

enum StoreGuard<'a> {
    Shared(RwLockReadGuard<'a, ObjectStoreData>),
    Exclusive(RwLockWriteGuard<'a, ObjectStoreData>),
}

impl StoreGuard<'_> {
    fn data(&self) -> &ObjectStoreData {
        match self {
            StoreGuard::Shared(guard) => &**guard,
            StoreGuard::Exclusive(guard) => &**guard,
        }
    }
}

struct MemoryObjectStore {
    name: String,
    parameters: StoreParameters,
    mode: TransactionMode,
    cell: StoreCell,
    phase: Arc<watch::Sender<TransactionPhase>>,
}

impl MemoryObjectStore {
    /// Move out of `Active`. Returns false when the transaction had already finished.
    fn finish(&self, phase: TransactionPhase) -> bool {
        self.phase.send_if_modified(|current| {
            if current.is_active() {
                *current = phase;
                true
            } else {
                false
            }
        })
    }

    fn ensure_active(&self) -> EngineResult<()> {
        match &*self.phase.borrow() {
            TransactionPhase::Active => Ok(()),
            TransactionPhase::Aborted(reason) => Err(EngineError::Abort(reason.clone())),
            _ => Err(EngineError::InvalidState("The transaction has finished.".into())),
        }
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(EngineError::ReadOnly("The transaction is read-only.".into()))
        }
    }

    /// Readers share the store lock, writers hold it exclusively.
    async fn lock(&self) -> EngineResult<StoreGuard<'_>> {
        self.ensure_active()?;
        let guard = match self.mode {
            TransactionMode::ReadOnly => StoreGuard::Shared(self.cell.read().await),
            TransactionMode::ReadWrite => StoreGuard::Exclusive(self.cell.write().await),
        };
        // The transaction may have been aborted while waiting for the lock.
        self.ensure_active()?;
        Ok(guard)
    }

    async fn lock_exclusive(&self) -> EngineResult<RwLockWriteGuard<'_, ObjectStoreData>> {
        self.ensure_active()?;
        self.ensure_writable()?;
        let guard = self.cell.write().await;
        self.ensure_active()?;
        Ok(guard)
    }

    fn complete<T>(&self, outcome: EngineResult<T>) -> EngineResult<T> {
        match &outcome {
            Ok(_) => {
                self.finish(TransactionPhase::Committed);
            }
            Err(EngineError::Abort(_)) => {}
            Err(err) => {
                self.finish(TransactionPhase::Failed(err.to_string()));
            }
        }
        outcome
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> &StoreParameters {
        &self.parameters
    }

    async fn get(&self, key: Key) -> EngineResult<Option<Record>> {
        let outcome = match self.lock().await {
            Ok(guard) => Ok(guard.data().get(&key).cloned()),
            Err(err) => Err(err),
        };
        self.complete(outcome)
    }

    async fn get_all(&self) -> EngineResult<Vec<Record>> {
        let outcome = match self.lock().await {
            Ok(guard) => Ok(guard.data().all()),
            Err(err) => Err(err),
        };
        self.complete(outcome)
    }

    async fn put(&self, record: Record, key: Option<Key>) -> EngineResult<Key> {
        let outcome = match self.lock_exclusive().await {
            Ok(mut guard) => guard.put(record, key),
            Err(err) => Err(err),
        };
        self.complete(outcome)
    }

    async fn delete(&self, key: Key) -> EngineResult<()> {
        let outcome = match self.lock_exclusive().await {
            Ok(mut guard) => {
                guard.delete(&key);
                Ok(())
            }
            Err(err) => Err(err),
        };
        self.complete(outcome)
    }

    async fn clear(&self) -> EngineResult<()> {
        let outcome = match self.lock_exclusive().await {
            Ok(mut guard) => {
                guard.clear();
                Ok(())
            }
            Err(err) => Err(err),
        };
        self.complete(outcome)
    }

    async fn count(&self) -> EngineResult<usize> {
        let outcome = match self.lock().await {
            Ok(guard) => Ok(guard.data().len()),
            Err(err) => Err(err),
        };
        self.complete(outcome)
    }
}
