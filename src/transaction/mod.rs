// ============================================================================
// Transaction Module
// ============================================================================
//
// Every session operation runs in its own short-lived transaction over one
// store. This module turns the engine's transaction (created synchronously,
// finished through phase signals) into a single awaited result.
//
// ============================================================================

pub mod scope;
pub mod state;

pub use scope::{ScopedStore, open_store, open_store_by_name};
pub use state::{TransactionId, TransactionMode, TransactionPhase};
