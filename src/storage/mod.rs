//! Storage Layer - SQLite-backed persistence of finished graphs
//!
//! The engine hands a [`GraphSnapshot`] to a [`GraphSink`] once a run is
//! complete. The SQLite sink keeps tables:
//! - nodes(id, kind, key, implicit)
//! - edges(id, kind, source, target, qualifier)
//! - files(id, node, path, language, fingerprint, indexed)
//! - locations(id, kind, element, owner, range)
//! - diagnostics(kind, file_path, message, fatal, range)

pub mod schema;
pub mod sqlite;

use crate::ingest::GraphSnapshot;
use crate::Result;

pub use sqlite::{DbStats, SqliteSink};

/// Durable destination for a finished, internally consistent graph.
pub trait GraphSink {
    fn commit(&mut self, snapshot: &GraphSnapshot) -> Result<()>;
}
