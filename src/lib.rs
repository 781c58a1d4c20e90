// ============================================================================
// Reign Library
// ============================================================================
//
// A session layer over a versioned, transactional key-value engine.
//
// Flow of a call:
//   Session -> open_store (one transaction, one store) -> ObjectStore request
//           -> ScopedStore::settle (request outcome vs. failure/abort signals)
//
// ============================================================================

pub mod core;
pub mod facade;
pub mod schema;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{ConfigError, DbError, Key, Record, Result};
pub use facade::{Session, SessionConfig, SessionState, VersionSpec};
pub use schema::{KeyPath, StoreConfig, StoreDeclarations, StoreDefinition, StoreInput, StoreOptions, ValidatedSchema};
pub use storage::{EngineError, MemoryEngine, StorageEngine};
pub use transaction::{ScopedStore, TransactionMode, TransactionPhase, open_store};
