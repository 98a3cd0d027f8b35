//! # Manuscript - typed object-graph persistence
//!
//! Persists a self-describing schema and the instance data that conforms to
//! it into a single SQLite file.
//!
//! Manuscript provides:
//! - Schema nodes (`ElementType`, `FieldType`, `ValueType`, project types)
//!   describing the shape of instance nodes
//! - Instance nodes (`Element`, `Field`, `Value`, projects) with ordered,
//!   index-preserving associations
//! - Class-table inheritance over a shared `Storable` identity table
//! - Identity-map caching with recycle pools, one live object per row
//! - Nested transactions with a single physical commit/rollback

pub mod storable;
pub mod variant;
pub mod model;
pub mod storage;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use storable::{Storable, StorableKind, StorableMeta};
pub use variant::{ValueKind, Variant};
pub use model::{
    AnyNode, Element, ElementRef, ElementType, ElementTypeRef, Field, FieldRef, FieldType,
    FieldTypeRef, Handle, Node, NodeData, Value, ValueRef, ValueType, ValueTypeRef, WeakHandle,
};
pub use storage::{DbStats, Storage};
pub use storage::transaction::{Mode, Transaction};

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No database is open")]
    NoDatabase,

    #[error("Query failed in {context}: {source} (sql: {sql}; bound: {bound})")]
    Query {
        context: &'static str,
        sql: String,
        bound: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invariant violated in {context}: {message}")]
    Invariant {
        context: &'static str,
        message: String,
    },

    #[error("Invalid row id: {0}")]
    InvalidRowId(i64),

    #[error("{kind} named '{name}' already exists")]
    NameTaken { kind: StorableKind, name: String },

    #[error("Row {id} not found in {table}")]
    NotFound { table: &'static str, id: i64 },

    #[error("Row {id} is stored as {found}, expected {expected}")]
    KindMismatch {
        id: i64,
        expected: StorableKind,
        found: String,
    },

    #[error("Cannot convert {value} to any allowed kind ({allowed})")]
    Conversion { value: String, allowed: String },

    #[error("Transaction aborted: a nested write failed")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
