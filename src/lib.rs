//! # Symgraph - Symbol Graph Ingestion Engine
//!
//! Folds the parse events language front ends emit into one deduplicated,
//! persistently addressable code graph.
//!
//! Symgraph provides:
//! - Canonical keys for qualified names, with access, abstraction, const,
//!   static and location context folded in
//! - A graph store with find-or-create identity for nodes and edges
//! - Per-file provenance, so one file can be retracted and re-indexed
//!   without disturbing what other files contributed
//! - Parallel ingestion from independent per-file event streams
//! - SQLite persistence of finished graphs

pub mod id;
pub mod name;
pub mod symbol;
pub mod edge;
pub mod graph;
pub mod location;
pub mod lifecycle;
pub mod ingest;
pub mod storage;
pub mod config;
pub mod ignore;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use edge::{Edge, EdgeKind, EdgeQualifier};
pub use graph::GraphStore;
pub use id::{EdgeId, ElementId, FileId, LocationId, NodeId};
pub use ingest::{Engine, GraphSnapshot, IngestionClient, ParseEvent};
pub use location::{Diagnostic, DiagnosticKind, LocationIndex, ParseLocation};
pub use name::{CanonicalKey, QualifiedName};
pub use storage::{GraphSink, SqliteSink};
pub use symbol::{Node, NodeKind};

/// Result type alias for Symgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Symgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid event on line {line}: {source}")]
    InvalidEvent {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// An edge was requested for a node that does not exist. Edge endpoints
    /// always go through find-or-create first, so this is a bug.
    #[error("Orphan {kind} edge: {missing} does not exist")]
    OrphanEdge { kind: EdgeKind, missing: NodeId },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("File already open: {0}")]
    FileAlreadyOpen(String),

    #[error("Unknown file: {0}")]
    UnknownFile(String),

    #[error("Graph state lock poisoned")]
    LockPoisoned,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("{0}")]
    InvalidKind(String),
}
