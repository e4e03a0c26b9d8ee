//! Persistence for principals and audit events
//!
//! Each store is a trait with a PostgreSQL implementation and an in-memory
//! one. The in-memory stores back local development when no database URL is
//! configured, and the test suite.

pub mod audit;
pub mod principals;

pub use audit::{AuditStore, InMemoryAuditStore, PgAuditStore};
pub use principals::{InMemoryPrincipalStore, PgPrincipalStore, PrincipalStore};

use thiserror::Error;

use crate::models::UnknownTag;

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("duplicate key violates unique constraint '{constraint}'")]
    DuplicateKey { constraint: String },

    #[error("database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A stored row could not be mapped back into a model
    #[error("corrupt row: {0}")]
    CorruptRow(#[from] UnknownTag),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }

    /// Classify a sqlx error, surfacing unique violations as `DuplicateKey`.
    pub(crate) fn from_sqlx(operation: &'static str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::DuplicateKey {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        StoreError::Database {
            operation,
            source: err,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
