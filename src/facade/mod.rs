// ============================================================================
// Facade Module
// ============================================================================
//
// The surface applications use:
// - config:  construction parameters and version parsing
// - session: lifecycle state machine and CRUD over single-store transactions
//
// ============================================================================

pub mod config;
pub mod session;

pub use config::{MAX_VERSION, SessionConfig, VersionSpec};
pub use session::{Session, SessionState};
