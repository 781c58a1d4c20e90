pub mod engine;
pub mod memory;
pub mod object_store;

pub use engine::{
    DatabaseInfo, EngineConnection, EngineError, EngineResult, EngineTransaction, ObjectStore, StorageEngine,
    UpgradeContext, UpgradeHandler,
};
pub use memory::{MemoryConnection, MemoryEngine};
