//! SQLite storage implementation

use super::schema;
use super::GraphSink;
use crate::edge::{Edge, EdgeKind, EdgeQualifier};
use crate::id::{EdgeId, ElementId, NodeId};
use crate::ingest::GraphSnapshot;
use crate::location::{Diagnostic, DiagnosticKind, ParseLocation, SourceFile, SourceLocation};
use crate::name::CanonicalKey;
use crate::symbol::{Node, NodeKind};
use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

/// SQLite-backed sink for finished graphs
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let sink = Self { conn };
        sink.initialize_schema()?;
        Ok(sink)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let sink = Self { conn };
        sink.initialize_schema()?;
        Ok(sink)
    }

    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Writing ==========

    fn write_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        self.clear_all()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('key_format_version', ?1)",
            [snapshot.key_format_version.to_string()],
        )?;

        for node in &snapshot.nodes {
            self.insert_node(node)?;
        }
        for edge in &snapshot.edges {
            self.insert_edge(edge)?;
        }
        for file in &snapshot.files {
            self.insert_file(file)?;
        }
        for location in &snapshot.locations {
            self.insert_location(location)?;
        }
        for diagnostic in &snapshot.diagnostics {
            self.insert_diagnostic(diagnostic)?;
        }
        Ok(())
    }

    fn insert_node(&self, node: &Node) -> Result<()> {
        self.conn.execute(
            "INSERT INTO nodes (id, kind, key, implicit) VALUES (?1, ?2, ?3, ?4)",
            params![node.id.get() as i64, node.kind.as_str(), node.key.as_str(), node.implicit],
        )?;
        Ok(())
    }

    fn insert_edge(&self, edge: &Edge) -> Result<()> {
        self.conn.execute(
            "INSERT INTO edges (id, kind, source, target, qualifier) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                edge.id.get() as i64,
                edge.kind.as_str(),
                edge.source.get() as i64,
                edge.target.get() as i64,
                serde_json::to_string(&edge.qualifier)?,
            ],
        )?;
        Ok(())
    }

    fn insert_file(&self, file: &SourceFile) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO files (id, node, path, language, fingerprint, indexed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                file.id.get() as i64,
                file.node.get() as i64,
                file.info.path,
                file.info.language.map(|l| l.as_str()),
                file.info.fingerprint,
                file.indexed,
            ],
        )?;
        Ok(())
    }

    fn insert_location(&self, location: &SourceLocation) -> Result<()> {
        let (element_kind, element_id) = match location.element {
            Some(ElementId::Node(id)) => (Some("node"), Some(id.get())),
            Some(ElementId::Edge(id)) => (Some("edge"), Some(id.get())),
            Some(ElementId::File(id)) => (Some("file"), Some(id.get())),
            Some(ElementId::Location(id)) => (Some("location"), Some(id.get())),
            None => (None, None),
        };
        let range = &location.range;
        self.conn.execute(
            r#"
            INSERT INTO locations (id, kind, element_kind, element_id, owner, path,
                                   start_line, start_column, end_line, end_column)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                location.id.get() as i64,
                location.kind.as_str(),
                element_kind,
                element_id.map(|id| id as i64),
                location.owner.get() as i64,
                range.path,
                range.start_line,
                range.start_column,
                range.end_line,
                range.end_column,
            ],
        )?;
        Ok(())
    }

    fn insert_diagnostic(&self, diagnostic: &Diagnostic) -> Result<()> {
        let range = diagnostic.location.as_ref();
        self.conn.execute(
            r#"
            INSERT INTO diagnostics (kind, file_path, message, fatal, path,
                                     start_line, start_column, end_line, end_column)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                diagnostic.kind.as_str(),
                diagnostic.path,
                diagnostic.message,
                diagnostic.fatal,
                range.map(|r| r.path.as_str()),
                range.map(|r| r.start_line),
                range.map(|r| r.start_column),
                range.map(|r| r.end_line),
                range.map(|r| r.end_column),
            ],
        )?;
        Ok(())
    }

    // ========== Reading ==========

    /// All nodes in id order
    pub fn nodes(&self) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare("SELECT id, kind, key, implicit FROM nodes ORDER BY id")?;
        let nodes = stmt
            .query_map([], |row| self.row_to_node(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Find a node by its canonical key
    pub fn node_by_key(&self, key: &str) -> Result<Option<Node>> {
        self.conn
            .query_row(
                "SELECT id, kind, key, implicit FROM nodes WHERE key = ?1",
                [key],
                |row| self.row_to_node(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Edges leaving a node
    pub fn edges_from(&self, source: NodeId) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, source, target, qualifier FROM edges WHERE source = ?1 ORDER BY id",
        )?;
        let edges = stmt
            .query_map([source.get() as i64], |row| self.row_to_edge(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// All edges in id order
    pub fn edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, kind, source, target, qualifier FROM edges ORDER BY id")?;
        let edges = stmt
            .query_map([], |row| self.row_to_edge(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Diagnostics in the order they were raised
    pub fn diagnostics(&self) -> Result<Vec<Diagnostic>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT kind, file_path, message, fatal, path, start_line, start_column, end_line, end_column
            FROM diagnostics ORDER BY id
            "#,
        )?;
        let diagnostics = stmt
            .query_map([], |row| self.row_to_diagnostic(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(diagnostics)
    }

    /// Key layout version the stored graph was written with
    pub fn key_format_version(&self) -> Result<Option<u32>> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'key_format_version'", [], |row| row.get(0))
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    fn row_to_node(&self, row: &rusqlite::Row) -> rusqlite::Result<Node> {
        let id: i64 = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let kind: NodeKind = kind_str.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let key: String = row.get(2)?;
        Ok(Node::new(NodeId(id as u64), kind, CanonicalKey::from(key), row.get(3)?))
    }

    fn row_to_edge(&self, row: &rusqlite::Row) -> rusqlite::Result<Edge> {
        let id: i64 = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let source: i64 = row.get(2)?;
        let target: i64 = row.get(3)?;
        let qualifier_str: String = row.get(4)?;

        let kind: EdgeKind = kind_str.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let qualifier: EdgeQualifier = serde_json::from_str(&qualifier_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Edge::new(
            EdgeId(id as u64),
            kind,
            NodeId(source as u64),
            NodeId(target as u64),
            qualifier,
        ))
    }

    fn row_to_diagnostic(&self, row: &rusqlite::Row) -> rusqlite::Result<Diagnostic> {
        let kind_str: String = row.get(0)?;
        let kind: DiagnosticKind = kind_str.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let location = match row.get::<_, Option<String>>(4)? {
            Some(path) => Some(ParseLocation::new(
                path,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            )),
            None => None,
        };
        Ok(Diagnostic {
            kind,
            location,
            path: row.get(1)?,
            message: row.get(2)?,
            fatal: row.get(3)?,
        })
    }

    fn count(&self, table: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Bulk Operations ==========

    /// Begin a transaction for bulk operations
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit_transaction(&mut self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    /// Delete all data
    pub fn clear_all(&self) -> Result<()> {
        for table in schema::TABLES_IN_DELETE_ORDER {
            self.conn.execute(&format!("DELETE FROM {}", table), [])?;
        }
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let implicit: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes WHERE implicit = 1", [], |row| row.get(0))?;
        Ok(DbStats {
            nodes: self.count("nodes")?,
            implicit_nodes: implicit as usize,
            edges: self.count("edges")?,
            files: self.count("files")?,
            locations: self.count("locations")?,
            diagnostics: self.count("diagnostics")?,
        })
    }
}

impl GraphSink for SqliteSink {
    /// Replace the stored graph with `snapshot` in one transaction.
    fn commit(&mut self, snapshot: &GraphSnapshot) -> Result<()> {
        self.begin_transaction()?;
        if let Err(err) = self.write_snapshot(snapshot) {
            tracing::warn!("Rolling back graph commit: {}", err);
            self.rollback()?;
            return Err(err);
        }
        self.commit_transaction()?;
        tracing::info!(
            "Committed {} node(s), {} edge(s), {} file(s)",
            snapshot.nodes.len(),
            snapshot.edges.len(),
            snapshot.files.len()
        );
        Ok(())
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub nodes: usize,
    pub implicit_nodes: usize,
    pub edges: usize,
    pub files: usize,
    pub locations: usize,
    pub diagnostics: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Nodes: {} (implicit: {})", self.nodes, self.implicit_nodes)?;
        writeln!(f, "  Edges: {}", self.edges)?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Locations: {}", self.locations)?;
        writeln!(f, "  Diagnostics: {}", self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{Declaration, Engine, IngestionClient, ParseEvent, Relationship};
    use crate::location::FileInfo;
    use crate::name::QualifiedName;
    use std::sync::Arc;

    fn loc(line: u32) -> ParseLocation {
        ParseLocation::new("a.cpp", line, 1, line, 6)
    }

    fn sample_engine() -> Arc<Engine> {
        let engine = Arc::new(Engine::new());
        let mut client = IngestionClient::new(engine.clone());
        client
            .handle_all(&[
                ParseEvent::StartParsing,
                ParseEvent::StartParsingFile { file: FileInfo::new("a.cpp") },
                ParseEvent::Function(Declaration::new(QualifiedName::from_path("main"), loc(1))),
                ParseEvent::Call(Relationship::new(
                    QualifiedName::from_path("main"),
                    QualifiedName::from_path("util::log"),
                    loc(2),
                )),
                ParseEvent::Comment { location: loc(4) },
                ParseEvent::Error {
                    location: Some(loc(3)),
                    message: "unknown type".to_string(),
                    fatal: false,
                },
                ParseEvent::FinishParsingFile { path: "a.cpp".to_string() },
                ParseEvent::FinishParsing,
            ])
            .unwrap();
        engine
    }

    #[test]
    fn test_commit_snapshot() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let snapshot = sample_engine().snapshot().unwrap();
        sink.commit(&snapshot).unwrap();

        let stats = sink.stats().unwrap();
        // file node, main, util::log
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.implicit_nodes, 1);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.locations, 3);
        assert_eq!(stats.diagnostics, 1);

        assert_eq!(sink.nodes().unwrap(), snapshot.nodes);
        assert_eq!(sink.edges().unwrap(), snapshot.edges);
        assert_eq!(sink.key_format_version().unwrap(), Some(crate::name::KEY_FORMAT_VERSION));
    }

    #[test]
    fn test_commit_replaces_previous_graph() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let snapshot = sample_engine().snapshot().unwrap();
        sink.commit(&snapshot).unwrap();
        sink.commit(&snapshot).unwrap();
        assert_eq!(sink.stats().unwrap().nodes, 3);

        sink.commit(&GraphSnapshot::default()).unwrap();
        assert_eq!(sink.stats().unwrap().nodes, 0);
    }

    #[test]
    fn test_diagnostics_readback() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let snapshot = sample_engine().snapshot().unwrap();
        sink.commit(&snapshot).unwrap();
        assert_eq!(sink.diagnostics().unwrap(), snapshot.diagnostics);
    }

    #[test]
    fn test_node_lookup_and_edges() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.commit(&sample_engine().snapshot().unwrap()).unwrap();

        let main = sink.node_by_key("main").unwrap().unwrap();
        assert_eq!(main.kind, NodeKind::Function);
        let calls = sink.edges_from(main.id).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].qualifier, EdgeQualifier::None);
        assert!(sink.node_by_key("missing").unwrap().is_none());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let mut sink = SqliteSink::open(&path).unwrap();
            sink.commit(&sample_engine().snapshot().unwrap()).unwrap();
        }
        let reopened = SqliteSink::open(&path).unwrap();
        assert_eq!(reopened.stats().unwrap().edges, 1);
    }
}
