/// Session tests
///
/// Lifecycle and CRUD behavior of `Session` over the in-memory engine.
/// Run with: cargo test --test session_tests

use reign::{
    ConfigError, DbError, EngineError, Key, KeyPath, MemoryEngine, Session, SessionConfig, SessionState,
    StorageEngine, StoreConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn isolated(config: SessionConfig) -> Session {
    Session::with_engine(config, Arc::new(MemoryEngine::new())).unwrap()
}

async fn open(config: SessionConfig) -> Session {
    let mut session = isolated(config);
    session.init().await.unwrap();
    session
}

#[tokio::test]
async fn test_shop_scenario() {
    let mut session = Session::new(SessionConfig::new("Shop", ["Orders", "Customers"], 1)).unwrap();
    session.init().await.unwrap();
    session.clear("Orders").await.unwrap();

    let key = session.update("Orders", json!({ "item": "pen" })).await.unwrap();
    assert!(key.as_integer().is_some());

    let record = session.get("Orders", key.clone()).await.unwrap().unwrap();
    assert_eq!(record["item"], "pen");

    session.delete("Orders", key.clone()).await.unwrap();
    assert_eq!(session.get("Orders", key).await.unwrap(), None);

    session.close().unwrap();
}

#[tokio::test]
async fn test_close_then_init_round_trip() {
    let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
    let mut session = Session::with_engine(SessionConfig::new("RoundTrip", ["Notes"], 1), engine).unwrap();

    session.init().await.unwrap();
    let key = session.update("Notes", json!({ "text": "first" })).await.unwrap();
    session.close().unwrap();

    assert!(matches!(session.state(), SessionState::Closed));
    assert!(session.get("Notes", key.clone()).await.unwrap_err().is_uninitialized());

    session.init().await.unwrap();
    assert_eq!(session.get("Notes", key).await.unwrap(), Some(json!({ "text": "first", "id": 1 })));
    let second = session.update("Notes", json!({ "text": "second" })).await.unwrap();
    assert_eq!(second, Key::Integer(2));
}

#[tokio::test]
async fn test_operations_before_init_are_rejected() {
    let session = isolated(SessionConfig::new("NotYet", ["Items"], 1));

    let err = session.update("Items", json!({})).await.unwrap_err();
    assert_eq!(err.to_string(), "The session must be opened before any operation. Call init() first.");

    assert!(assert_err!(session.update_with_key("Items", json!({}), 1).await).is_uninitialized());
    assert!(assert_err!(session.read("Items").await).is_uninitialized());
    assert!(assert_err!(session.get("Items", 1).await).is_uninitialized());
    assert!(assert_err!(session.delete("Items", 1).await).is_uninitialized());
    assert!(assert_err!(session.clear("Items").await).is_uninitialized());
    assert!(assert_err!(session.is_exist("Items", 1).await).is_uninitialized());
    assert!(assert_err!(session.count("Items").await).is_uninitialized());

    // Checked before the store name.
    assert!(assert_err!(session.read("").await).is_uninitialized());
}

#[tokio::test]
async fn test_close_without_connection() {
    let mut session = isolated(SessionConfig::new("Idle", ["Items"], 1));

    let err = session.close().unwrap_err();
    assert!(matches!(err, DbError::NotOpen));
    assert_eq!(err.to_string(), "No active connection to close");

    session.init().await.unwrap();
    session.close().unwrap();
    assert!(matches!(session.close(), Err(DbError::NotOpen)));
    assert!(matches!(session.state(), SessionState::Closed));
}

#[tokio::test]
async fn test_is_exist() {
    let session = open(SessionConfig::new("Exists", ["Users"], 1)).await;

    assert!(!assert_ok!(session.is_exist("Users", 42).await));

    session.update("Users", json!({ "id": 42, "name": "Ada" })).await.unwrap();
    assert!(assert_ok!(session.is_exist("Users", 42).await));
    assert!(!assert_ok!(session.is_exist("Users", "42").await));
}

#[tokio::test]
async fn test_delete_missing_key() {
    let session = open(SessionConfig::new("Deletes", ["Users"], 1)).await;

    assert_ok!(session.delete("Users", 999).await);
    assert_ok!(session.delete("Users", "nobody").await);
    assert_eq!(session.count("Users").await.unwrap(), 0);
}

#[tokio::test]
async fn test_out_of_line_store() {
    let stores = vec![StoreConfig::named("Logs").out_of_line().auto_increment(false)];
    let session = open(SessionConfig::new("Audit", stores, 1)).await;

    let logs = session.schema().store("Logs").unwrap();
    assert_eq!(logs.key_path, KeyPath::OutOfLine);
    assert!(!logs.auto_increment);

    let err = session.update("Logs", json!({ "msg": "boot" })).await.unwrap_err();
    assert!(matches!(err.engine_error(), Some(EngineError::Data(_))));

    let key = session.update_with_key("Logs", json!({ "msg": "boot" }), "2024-01-01T00:00").await.unwrap();
    assert_eq!(key, Key::from("2024-01-01T00:00"));
    assert_eq!(session.get("Logs", key).await.unwrap(), Some(json!({ "msg": "boot" })));
}

#[tokio::test]
async fn test_bad_version_rejected_before_engine() {
    for version in [json!(0), json!(1.5), json!(-2), json!("1"), json!(null)] {
        let config = SessionConfig::from_json(&json!({
            "databaseName": "Versions",
            "storeNames": ["a"],
            "version": version
        }));
        let err = Session::new(config).unwrap_err();
        assert!(matches!(err, DbError::Configuration(ConfigError::InvalidVersion(_))));
    }

    // Nothing was opened on the shared engine.
    let databases = MemoryEngine::global().databases().await;
    assert!(databases.iter().all(|db| db.name != "Versions"));
}

#[tokio::test]
async fn test_invalid_configuration() {
    let err = Session::new(SessionConfig::new("", ["a"], 1)).unwrap_err();
    assert!(matches!(err, DbError::Configuration(ConfigError::InvalidDatabaseName)));

    let err = Session::new(SessionConfig::new("db", Vec::<&str>::new(), 1)).unwrap_err();
    assert!(matches!(err, DbError::Configuration(ConfigError::NoStores)));

    let err = Session::new(SessionConfig::new("db", json!("Orders"), 1)).unwrap_err();
    assert!(matches!(err, DbError::StoreDefinitionShape(_)));

    let err = Session::new(SessionConfig::new("db", json!({ "Orders": true }), 1)).unwrap_err();
    assert!(matches!(err, DbError::StoreDefinitionShape(_)));

    let err = Session::new(SessionConfig::new("db", json!([{ "name": "a", "autoIncrement": "yes" }]), 1)).unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_declaration_shapes_open_same_stores() {
    let mut map = BTreeMap::new();
    map.insert("Customers".to_string(), None);
    map.insert("Orders".to_string(), Some(StoreConfig::default()));

    let shapes = [
        SessionConfig::new("Shapes", ["Customers", "Orders"], 1),
        SessionConfig::new("Shapes", vec![StoreConfig::named("Customers"), StoreConfig::named("Orders")], 1),
        SessionConfig::new("Shapes", map, 1),
        SessionConfig::new("Shapes", json!({ "Orders": {}, "Customers": null }), 1),
    ];

    for config in shapes {
        let session = open(config).await;
        assert_eq!(session.store_names().unwrap(), vec!["Customers", "Orders"]);
        for store in &session.schema().stores {
            assert_eq!(store.key_path, KeyPath::single("id"));
            assert!(store.auto_increment);
        }
    }
}

#[tokio::test]
async fn test_independent_sessions() {
    let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
    let config = SessionConfig::new("Shared", ["Items"], 1);

    let mut first = Session::with_engine(config.clone(), engine.clone()).unwrap();
    let mut second = Session::with_engine(config, engine.clone()).unwrap();
    first.init().await.unwrap();
    second.init().await.unwrap();

    let key = first.update("Items", json!({ "n": 1 })).await.unwrap();
    first.close().unwrap();

    assert!(second.is_open());
    assert!(second.is_exist("Items", key).await.unwrap());

    let mut other = Session::with_engine(SessionConfig::new("Elsewhere", ["Items"], 1), engine).unwrap();
    other.init().await.unwrap();
    assert_eq!(other.count("Items").await.unwrap(), 0);
    second.close().unwrap();
    assert_eq!(other.count("Items").await.unwrap(), 0);
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
    let config = SessionConfig::new("Stable", ["Items"], 1);

    let mut session = Session::with_engine(config.clone(), engine.clone()).unwrap();
    session.init().await.unwrap();
    session.update("Items", json!({ "keep": true })).await.unwrap();

    // Second init on an open session does nothing.
    session.init().await.unwrap();
    assert_eq!(session.count("Items").await.unwrap(), 1);
    session.close().unwrap();

    // Same version again: no upgrade, data untouched.
    let mut again = Session::with_engine(config, engine.clone()).unwrap();
    again.init().await.unwrap();
    assert_eq!(again.count("Items").await.unwrap(), 1);
    again.close().unwrap();

    // Higher version adds stores and leaves existing ones alone.
    let mut upgraded = Session::with_engine(SessionConfig::new("Stable", ["Items", "Tags"], 2), engine).unwrap();
    upgraded.init().await.unwrap();
    assert_eq!(upgraded.count("Items").await.unwrap(), 1);
    assert_eq!(upgraded.store_names().unwrap(), vec!["Items", "Tags"]);
}

#[tokio::test]
async fn test_failed_init_keeps_state() {
    let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());

    let mut newer = Session::with_engine(SessionConfig::new("Versioned", ["Items"], 3), engine.clone()).unwrap();
    newer.init().await.unwrap();

    let mut older = Session::with_engine(SessionConfig::new("Versioned", ["Items"], 2), engine).unwrap();
    let err = older.init().await.unwrap_err();
    assert!(matches!(err, DbError::Engine(EngineError::Version(_))));
    assert!(matches!(older.state(), SessionState::Uninitialized));

    // An upgrade the engine refuses fails the same way.
    let bad = vec![StoreConfig::named("Pairs").key_path(vec!["a", "b"]).auto_increment(true)];
    let mut refused = Session::with_engine(SessionConfig::new("Refused", bad, 1), Arc::new(MemoryEngine::new())).unwrap();
    let err = refused.init().await.unwrap_err();
    assert!(matches!(err.engine_error(), Some(EngineError::InvalidAccess(_))));
    assert!(!refused.is_open());
}

#[tokio::test]
async fn test_unknown_store() {
    let session = open(SessionConfig::new("Known", ["Items"], 1)).await;

    let err = session.read("NonExistentStore").await.unwrap_err();
    assert!(matches!(err, DbError::TransactionCreation(_)));
    assert_eq!(
        err.to_string(),
        "Failed to create a transaction: No objectStore named NonExistentStore in this database"
    );
}

#[tokio::test]
async fn test_read_clear_count() {
    let session = open(SessionConfig::new("Bulk", ["Items"], 1)).await;

    for n in 0..5 {
        session.update("Items", json!({ "n": n })).await.unwrap();
    }
    assert_eq!(session.count("Items").await.unwrap(), 5);

    let records = session.read("Items").await.unwrap();
    let ns: Vec<i64> = records.iter().map(|r| r["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![0, 1, 2, 3, 4]);

    session.clear("Items").await.unwrap();
    assert!(session.read("Items").await.unwrap().is_empty());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Customer {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    email: String,
}

#[tokio::test]
async fn test_typed_records() {
    let session = open(SessionConfig::new("Typed", ["Customers"], 1)).await;

    let key = session
        .put_as("Customers", &Customer { id: None, email: "ada@example.com".into() })
        .await
        .unwrap();

    let customer: Customer = session.get_as("Customers", key).await.unwrap().unwrap();
    assert_eq!(customer, Customer { id: Some(1), email: "ada@example.com".into() });

    let all: Vec<Customer> = session.read_as("Customers").await.unwrap();
    assert_eq!(all.len(), 1);

    let missing: Option<Customer> = session.get_as("Customers", 99).await.unwrap();
    assert!(missing.is_none());

    session.update("Customers", json!({ "id": 2, "email": 7 })).await.unwrap();
    let err = session.read_as::<Customer>("Customers").await.unwrap_err();
    assert!(matches!(err, DbError::Serialization(_)));
}

#[tokio::test]
async fn test_concurrent_writes() {
    let session = open(SessionConfig::new("Concurrent", ["Items", "Other"], 1)).await;

    let (a, b, c, d) = futures::join!(
        session.update("Items", json!({ "n": 1 })),
        session.update("Items", json!({ "n": 2 })),
        session.update("Other", json!({ "n": 3 })),
        session.count("Items"),
    );

    let mut keys = vec![a.unwrap(), b.unwrap()];
    keys.sort();
    assert_eq!(keys, vec![Key::Integer(1), Key::Integer(2)]);
    assert_eq!(c.unwrap(), Key::Integer(1));
    assert!(d.unwrap() <= 2);
    assert_eq!(session.count("Items").await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_tasks() {
    let session = Arc::new(open(SessionConfig::new("Tasks", ["Items"], 1)).await);

    let mut handles = vec![];
    for task_id in 0..5 {
        let session_clone = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                session_clone
                    .update("Items", json!({ "task": task_id, "i": i }))
                    .await
                    .unwrap();
            }
        }));
    }

    for handle in futures::future::join_all(handles).await {
        handle.unwrap();
    }
    assert_eq!(session.count("Items").await.unwrap(), 50);
}

#[tokio::test]
async fn test_delete_database_resets_schema() {
    let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());

    let mut session = Session::with_engine(SessionConfig::new("Scratch", ["Items"], 2), engine.clone()).unwrap();
    session.init().await.unwrap();
    session.update("Items", json!({})).await.unwrap();
    session.close().unwrap();

    engine.delete_database("Scratch").await.unwrap();
    assert!(engine.databases().await.is_empty());

    session.init().await.unwrap();
    assert_eq!(session.count("Items").await.unwrap(), 0);
}
