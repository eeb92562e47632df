//! File Lifecycle Manager - per-file contribution tracking
//!
//! Records which nodes and edges each file's ingestion justified, so that a
//! single file can be retracted without disturbing what other files
//! contributed. Re-indexing is always retract-then-rebuild; nothing is diffed.

use crate::graph::GraphStore;
use crate::id::{EdgeId, FileId, NodeId};
use crate::location::{FileInfo, LocationIndex};
use crate::name::CanonicalKey;
use crate::symbol::NodeKind;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub path: String,
    pub state: FileState,
}

/// Elements justified by one file's last ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributionSet {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
}

impl ContributionSet {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// What one file said about a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeEvidence {
    explicit: bool,
    kind: NodeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetractionReport {
    pub nodes_removed: usize,
    pub edges_removed: usize,
    pub locations_removed: usize,
    /// Surviving nodes whose kind or implicit flag was re-derived
    pub nodes_restored: usize,
}

#[derive(Debug, Default)]
pub struct FileLifecycleManager {
    records: BTreeMap<FileId, FileRecord>,
    contributions: HashMap<FileId, ContributionSet>,
    node_evidence: HashMap<NodeId, BTreeMap<FileId, NodeEvidence>>,
    edge_contributors: HashMap<EdgeId, BTreeSet<FileId>>,
}

impl FileLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file for ingestion.
    ///
    /// Fails if the file is already open. A file that was ingested before is
    /// retracted first. The file's own node is created and attributed to it.
    pub fn begin_file(
        &mut self,
        info: &FileInfo,
        graph: &mut GraphStore,
        locations: &mut LocationIndex,
    ) -> Result<FileId> {
        if let Some(previous) = self.record_for_path(&info.path).cloned() {
            if previous.state == FileState::Open {
                return Err(Error::FileAlreadyOpen(info.path.clone()));
            }
            tracing::debug!("Re-indexing {}, retracting previous contribution", info.path);
            self.retract_file(previous.id, graph, locations);
        }

        let node = graph
            .get_or_create_node(NodeKind::File, &CanonicalKey::for_file(&info.path), false)
            .id;
        let id = locations.record_file(info, node);
        locations.clear_diagnostics_for(&info.path);
        self.records.insert(
            id,
            FileRecord {
                id,
                path: info.path.clone(),
                state: FileState::Open,
            },
        );
        self.attribute_node(id, node, true, NodeKind::File);
        tracing::debug!("Opened {} as {}", info.path, id);
        Ok(id)
    }

    /// Close a file whose event stream completed.
    pub fn end_file(&mut self, id: FileId, locations: &mut LocationIndex) -> Result<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::UnknownFile(id.to_string()))?;
        record.state = FileState::Closed;
        locations.set_indexed(id, true);
        Ok(())
    }

    /// Note that `file` justifies `node`.
    pub fn attribute_node(&mut self, file: FileId, node: NodeId, explicit: bool, kind: NodeKind) {
        self.contributions.entry(file).or_default().nodes.insert(node);
        let evidence = self
            .node_evidence
            .entry(node)
            .or_default()
            .entry(file)
            .or_insert(NodeEvidence { explicit, kind });
        evidence.explicit |= explicit;
        if !evidence.kind.is_defined() {
            evidence.kind = kind;
        }
    }

    /// Note that `file` justifies `edge`.
    pub fn attribute_edge(&mut self, file: FileId, edge: EdgeId) {
        self.contributions.entry(file).or_default().edges.insert(edge);
        self.edge_contributors.entry(edge).or_default().insert(file);
    }

    /// Discard everything only `file` justified.
    ///
    /// Edges go first, then locations, then nodes, so no edge ever points at
    /// a removed node. Elements other files still justify stay, and are
    /// re-derived from the evidence that remains. Unknown or already
    /// retracted files are a no-op.
    pub fn retract_file(
        &mut self,
        file: FileId,
        graph: &mut GraphStore,
        locations: &mut LocationIndex,
    ) -> RetractionReport {
        let mut report = RetractionReport::default();
        let contribution = self.contributions.remove(&file).unwrap_or_default();
        let had_record = self.records.remove(&file).is_some();
        if !had_record && contribution.is_empty() {
            return report;
        }

        for edge in &contribution.edges {
            let orphaned = match self.edge_contributors.get_mut(edge) {
                Some(files) => {
                    files.remove(&file);
                    files.is_empty()
                }
                None => true,
            };
            if orphaned {
                self.edge_contributors.remove(edge);
                if graph.remove_edge(*edge).is_some() {
                    report.edges_removed += 1;
                }
            }
        }

        report.locations_removed = locations.remove_owned_by(file);

        for node in &contribution.nodes {
            let remaining = match self.node_evidence.get_mut(node) {
                Some(evidence) => {
                    evidence.remove(&file);
                    evidence.clone()
                }
                None => BTreeMap::new(),
            };
            if remaining.is_empty() {
                self.node_evidence.remove(node);
                if graph.remove_node_if_orphaned(*node) {
                    report.nodes_removed += 1;
                }
            } else if self.restore_node(*node, &remaining, graph) {
                report.nodes_restored += 1;
            }
        }

        locations.set_indexed(file, false);
        locations.prune_files(|node| graph.contains_node(node));

        tracing::debug!(
            "Retracted {}: {} node(s), {} edge(s), {} location(s) removed",
            file,
            report.nodes_removed,
            report.edges_removed,
            report.locations_removed
        );
        report
    }

    /// Re-derive a surviving node's kind and implicit flag from the
    /// evidence other files still provide. Returns whether anything changed.
    fn restore_node(&self, node: NodeId, remaining: &BTreeMap<FileId, NodeEvidence>, graph: &mut GraphStore) -> bool {
        let Some(current) = graph.node(node) else {
            return false;
        };
        let implicit = !remaining.values().any(|e| e.explicit);
        let kind = if remaining.values().any(|e| e.kind == current.kind) {
            current.kind
        } else {
            remaining
                .values()
                .map(|e| e.kind)
                .find(NodeKind::is_defined)
                .unwrap_or(NodeKind::Undefined)
        };
        if kind == current.kind && implicit == current.implicit {
            return false;
        }
        graph.restore_node(node, kind, implicit);
        true
    }

    pub fn record(&self, id: FileId) -> Option<&FileRecord> {
        self.records.get(&id)
    }

    pub fn record_for_path(&self, path: &str) -> Option<&FileRecord> {
        self.records.values().find(|r| r.path == path)
    }

    pub fn is_open(&self, id: FileId) -> bool {
        self.records.get(&id).is_some_and(|r| r.state == FileState::Open)
    }

    /// Files whose ingestion currently justifies `node`.
    pub fn node_contributors(&self, node: NodeId) -> Vec<FileId> {
        self.node_evidence
            .get(&node)
            .map(|files| files.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Files whose ingestion currently justifies `edge`.
    pub fn edge_contributors(&self, edge: EdgeId) -> Vec<FileId> {
        self.edge_contributors
            .get(&edge)
            .map(|files| files.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{EdgeKind, EdgeQualifier};
    use crate::id::ElementId;
    use crate::location::{LocationKind, ParseLocation};

    struct Fixture {
        graph: GraphStore,
        locations: LocationIndex,
        files: FileLifecycleManager,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: GraphStore::new(),
                locations: LocationIndex::new(),
                files: FileLifecycleManager::new(),
            }
        }

        fn begin(&mut self, path: &str) -> FileId {
            self.files
                .begin_file(&FileInfo::new(path), &mut self.graph, &mut self.locations)
                .unwrap()
        }

        fn declare(&mut self, file: FileId, name: &str, kind: NodeKind, explicit: bool) -> NodeId {
            let id = self
                .graph
                .get_or_create_node(kind, &CanonicalKey::from(name.to_string()), !explicit)
                .id;
            self.files.attribute_node(file, id, explicit, kind);
            id
        }

        fn retract(&mut self, file: FileId) -> RetractionReport {
            self.files.retract_file(file, &mut self.graph, &mut self.locations)
        }
    }

    #[test]
    fn test_begin_twice_fails_while_open() {
        let mut fx = Fixture::new();
        fx.begin("a.cpp");
        let err = fx
            .files
            .begin_file(&FileInfo::new("a.cpp"), &mut fx.graph, &mut fx.locations);
        assert!(matches!(err, Err(Error::FileAlreadyOpen(_))));
    }

    #[test]
    fn test_retract_removes_sole_contributions() {
        let mut fx = Fixture::new();
        let a = fx.begin("a.cpp");
        let foo = fx.declare(a, "Foo", NodeKind::Class, true);
        let bar = fx.declare(a, "bar", NodeKind::Function, true);
        let edge = fx
            .graph
            .get_or_create_edge(EdgeKind::TypeUsage, bar, foo, EdgeQualifier::None)
            .unwrap()
            .id;
        fx.files.attribute_edge(a, edge);
        fx.locations.record_location(
            Some(ElementId::Node(foo)),
            LocationKind::Token,
            &ParseLocation::new("a.cpp", 1, 7, 1, 9),
            a,
        );
        fx.files.end_file(a, &mut fx.locations).unwrap();

        let report = fx.retract(a);
        assert_eq!(report.edges_removed, 1);
        // Foo, bar and the file node itself
        assert_eq!(report.nodes_removed, 3);
        assert_eq!(report.locations_removed, 1);
        assert_eq!(fx.graph.node_count(), 0);
        assert!(fx.locations.file_id("a.cpp").is_none());
        assert!(fx.files.record(a).is_none());
    }

    #[test]
    fn test_retract_keeps_shared_elements() {
        let mut fx = Fixture::new();
        let c = fx.begin("c.cpp");
        let log_c = fx.declare(c, "util::log", NodeKind::Function, true);
        let d = fx.begin("d.cpp");
        let log_d = fx.declare(d, "util::log", NodeKind::Function, true);
        assert_eq!(log_c, log_d);
        assert_eq!(fx.files.node_contributors(log_c), vec![c, d]);

        fx.retract(c);
        assert!(fx.graph.contains_node(log_c));
        assert_eq!(fx.files.node_contributors(log_c), vec![d]);

        fx.retract(d);
        assert!(!fx.graph.contains_node(log_c));
    }

    #[test]
    fn test_retract_is_idempotent() {
        let mut fx = Fixture::new();
        let a = fx.begin("a.cpp");
        fx.declare(a, "x", NodeKind::GlobalVariable, true);
        fx.retract(a);
        assert_eq!(fx.retract(a), RetractionReport::default());
        assert_eq!(fx.retract(FileId(42)), RetractionReport::default());
    }

    #[test]
    fn test_retract_restores_implicit_from_remaining_evidence() {
        let mut fx = Fixture::new();
        let a = fx.begin("a.cpp");
        let ctor = fx.declare(a, "Foo::Foo", NodeKind::Method, true);
        let b = fx.begin("b.cpp");
        fx.graph
            .get_or_create_node(NodeKind::Undefined, &CanonicalKey::from("Foo::Foo".to_string()), true);
        fx.files.attribute_node(b, ctor, false, NodeKind::Undefined);
        assert!(!fx.graph.node(ctor).unwrap().implicit);

        let report = fx.retract(a);
        assert_eq!(report.nodes_restored, 1);
        let node = fx.graph.node(ctor).unwrap();
        assert!(node.implicit);
        assert_eq!(node.kind, NodeKind::Undefined);
    }

    #[test]
    fn test_begin_again_reindexes() {
        let mut fx = Fixture::new();
        let a = fx.begin("a.cpp");
        fx.declare(a, "old", NodeKind::Function, true);
        fx.files.end_file(a, &mut fx.locations).unwrap();

        let again = fx.begin("a.cpp");
        assert_eq!(a, again);
        assert!(fx.graph.node_by_key(&CanonicalKey::from("old".to_string())).is_none());
        assert!(fx.files.is_open(again));
    }
}
