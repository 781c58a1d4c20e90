use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{TransactionMode, TransactionPhase};
use crate::core::{DbError, Result};
use crate::storage::{EngineConnection, EngineResult, EngineTransaction, ObjectStore};

/// A store handle together with the transaction it belongs to.
///
/// The transaction's failure and abort signals are subscribed before the
/// handle is handed out, so [`settle`](ScopedStore::settle) sees failures that
/// happen while a request is still in flight.
pub struct ScopedStore {
    name: String,
    mode: TransactionMode,
    transaction: Box<dyn EngineTransaction>,
    handle: Arc<dyn ObjectStore>,
    events: watch::Receiver<TransactionPhase>,
}

/// Start a single-store transaction on `connection`.
///
/// Checks run in order: open connection, store name, mode. Engine refusals
/// at creation time become [`DbError::TransactionCreation`].
pub fn open_store(
    connection: Option<&dyn EngineConnection>,
    store: &str,
    mode: TransactionMode,
) -> Result<ScopedStore> {
    open_store_with(connection, store, || Ok(mode))
}

/// Same as [`open_store`], with the mode spelled `"readonly"` or `"readwrite"`.
pub fn open_store_by_name(
    connection: Option<&dyn EngineConnection>,
    store: &str,
    mode: &str,
) -> Result<ScopedStore> {
    open_store_with(connection, store, || mode.parse())
}

fn open_store_with(
    connection: Option<&dyn EngineConnection>,
    store: &str,
    mode: impl FnOnce() -> Result<TransactionMode>,
) -> Result<ScopedStore> {
    let connection = connection.ok_or(DbError::Uninitialized)?;

    if store.is_empty() {
        return Err(DbError::InvalidArgument("Store name cannot be empty".into()));
    }

    let mode = mode()?;

    let transaction = connection.transaction(store, mode).map_err(|err| {
        warn!(database = %connection.name(), store, %mode, error = %err, "transaction creation failed");
        DbError::TransactionCreation(err.message().to_string())
    })?;

    let events = transaction.subscribe();

    let handle = transaction
        .store(store)
        .map_err(|err| DbError::TransactionCreation(err.message().to_string()))?;

    Ok(ScopedStore {
        name: store.to_string(),
        mode,
        transaction,
        handle,
        events,
    })
}

impl ScopedStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn handle(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.handle)
    }

    pub fn phase(&self) -> TransactionPhase {
        self.events.borrow().clone()
    }

    pub fn abort(&self) {
        self.transaction.abort();
    }

    /// Await one request issued against [`handle`](ScopedStore::handle).
    ///
    /// Resolves with the request's own outcome, unless the transaction fails
    /// or aborts first, which rejects with [`DbError::TransactionFailed`] or
    /// [`DbError::TransactionAborted`].
    pub async fn settle<T, F>(self, request: F) -> Result<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let ScopedStore {
            name,
            mode,
            transaction,
            mut events,
            ..
        } = self;

        tokio::pin!(request);

        let settled = tokio::select! {
            biased;

            failure = terminal_failure(&mut events) => Settled::Signal(failure),
            outcome = &mut request => Settled::Request(outcome),
        };

        let outcome = match settled {
            Settled::Request(outcome) => outcome.map_err(DbError::from),
            Settled::Signal(Some(TransactionPhase::Failed(reason))) => {
                warn!(store = %name, %mode, %reason, "transaction failed");
                Err(DbError::TransactionFailed(reason))
            }
            Settled::Signal(Some(TransactionPhase::Aborted(reason))) => {
                warn!(store = %name, %mode, %reason, "transaction aborted");
                Err(DbError::TransactionAborted(reason))
            }
            // Committed, or no more signals: the request decides.
            Settled::Signal(_) => request.await.map_err(DbError::from),
        };

        debug!(store = %name, %mode, phase = %*events.borrow(), ok = outcome.is_ok(), "request settled");
        drop(transaction);
        outcome
    }
}

enum Settled<T> {
    Signal(Option<TransactionPhase>),
    Request(EngineResult<T>),
}

/// Resolves with the failing phase, or `None` once the transaction commits
/// or its signal source goes away.
async fn terminal_failure(events: &mut watch::Receiver<TransactionPhase>) -> Option<TransactionPhase> {
    loop {
        let phase = events.borrow_and_update().clone();
        match phase {
            TransactionPhase::Failed(_) | TransactionPhase::Aborted(_) => return Some(phase),
            TransactionPhase::Committed => return None,
            TransactionPhase::Active => {}
        }
        if events.changed().await.is_err() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Key;
    use crate::schema::StoreParameters;
    use crate::storage::{MemoryEngine, StorageEngine, UpgradeContext, UpgradeHandler};
    use serde_json::json;

    struct TestStore;

    impl UpgradeHandler for TestStore {
        fn upgrade(&self, db: &mut dyn UpgradeContext, _: u64, _: u64) -> EngineResult<()> {
            db.create_store("TestStore", &StoreParameters::default())
        }
    }

    async fn connection() -> Box<dyn EngineConnection> {
        MemoryEngine::new().open("TestDB", 1, &TestStore).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_store() {
        let conn = connection().await;
        let scoped = open_store(Some(conn.as_ref()), "TestStore", TransactionMode::ReadOnly).unwrap();

        assert_eq!(scoped.name(), "TestStore");
        assert_eq!(scoped.mode(), TransactionMode::ReadOnly);
        assert_eq!(scoped.handle().name(), "TestStore");
        assert_eq!(scoped.phase(), TransactionPhase::Active);
    }

    #[tokio::test]
    async fn test_argument_checks_in_order() {
        let err = open_store_by_name(None, "", "bogus").err().unwrap();
        assert!(matches!(err, DbError::Uninitialized));

        let conn = connection().await;
        let err = open_store_by_name(Some(conn.as_ref()), "", "bogus").err().unwrap();
        assert!(matches!(err, DbError::InvalidArgument(_)));

        let err = open_store_by_name(Some(conn.as_ref()), "TestStore", "").err().unwrap();
        assert!(matches!(err, DbError::InvalidArgument(_)));

        assert!(open_store_by_name(Some(conn.as_ref()), "TestStore", "readwrite").is_ok());
    }

    #[tokio::test]
    async fn test_unknown_store_is_creation_error() {
        let conn = connection().await;
        let err = open_store(Some(conn.as_ref()), "NonExistentStore", TransactionMode::ReadOnly)
            .err()
            .unwrap();

        assert_eq!(
            err.to_string(),
            "Failed to create a transaction: No objectStore named NonExistentStore in this database"
        );
    }

    #[tokio::test]
    async fn test_closed_connection_is_creation_error() {
        let conn = connection().await;
        conn.close();

        let err = open_store(Some(conn.as_ref()), "TestStore", TransactionMode::ReadOnly)
            .err()
            .unwrap();
        assert!(matches!(err, DbError::TransactionCreation(_)));
    }

    #[tokio::test]
    async fn test_settle_resolves_request() {
        let conn = connection().await;

        let scoped = open_store(Some(conn.as_ref()), "TestStore", TransactionMode::ReadWrite).unwrap();
        let handle = scoped.handle();
        let key = scoped.settle(handle.put(json!({ "name": "a" }), None)).await.unwrap();

        let scoped = open_store(Some(conn.as_ref()), "TestStore", TransactionMode::ReadOnly).unwrap();
        let handle = scoped.handle();
        let record = scoped.settle(handle.get(key)).await.unwrap();
        assert_eq!(record, Some(json!({ "name": "a", "id": 1 })));
    }

    #[tokio::test]
    async fn test_settle_reports_request_error_unchanged() {
        let conn = connection().await;

        let scoped = open_store(Some(conn.as_ref()), "TestStore", TransactionMode::ReadOnly).unwrap();
        let handle = scoped.handle();
        let err = scoped.settle(handle.clear()).await.unwrap_err();
        assert!(matches!(err, DbError::Engine(crate::storage::EngineError::ReadOnly(_))));
    }

    #[tokio::test]
    async fn test_abort_after_handle_issued() {
        let conn = connection().await;

        let scoped = open_store(Some(conn.as_ref()), "TestStore", TransactionMode::ReadOnly).unwrap();
        let handle = scoped.handle();
        scoped.abort();

        let err = scoped.settle(handle.get(Key::Integer(1))).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionAborted(_)));
    }
}
