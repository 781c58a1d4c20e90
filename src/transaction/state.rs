// ============================================================================
// Transaction State
// ============================================================================
//
// A transaction is scoped to one store and one access mode and moves through:
//
//   Active ──request ok──────> Committed
//     │
//     ├──request error──────> Failed
//     └──abort──────────────> Aborted
//
// ============================================================================

use crate::core::DbError;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction, used in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

impl TransactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, TransactionMode::ReadWrite)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionMode {
    type Err = DbError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "readonly" => Ok(TransactionMode::ReadOnly),
            "readwrite" => Ok(TransactionMode::ReadWrite),
            "" => Err(DbError::InvalidArgument("Mode cannot be empty".into())),
            other => Err(DbError::InvalidArgument(format!(
                "Unknown transaction mode '{}', expected 'readonly' or 'readwrite'",
                other
            ))),
        }
    }
}

/// Lifecycle phase of a transaction, as broadcast by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionPhase {
    Active,
    Committed,
    Failed(String),
    Aborted(String),
}

impl TransactionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionPhase::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TransactionPhase::Failed(_) | TransactionPhase::Aborted(_))
    }
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionPhase::Active => write!(f, "ACTIVE"),
            TransactionPhase::Committed => write!(f, "COMMITTED"),
            TransactionPhase::Failed(reason) => write!(f, "FAILED ({})", reason),
            TransactionPhase::Aborted(reason) => write!(f, "ABORTED ({})", reason),
        }
    }
}
