//! Graph Store - the node and edge tables
//!
//! Owns every [`Node`] and [`Edge`] record. Identity is assigned here, always
//! through find-or-create: nodes are keyed by [`CanonicalKey`], edges by their
//! `(kind, source, target)` triple. Removal is only used by file retraction.

use crate::edge::{Edge, EdgeKind, EdgeQualifier};
use crate::id::{EdgeId, IdAllocator, NodeId};
use crate::name::CanonicalKey;
use crate::symbol::{Node, NodeKind};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What `get_or_create_node` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOutcome {
    pub id: NodeId,
    pub created: bool,
    /// Implicit flag was cleared by this call
    pub upgraded: bool,
    /// Existing concrete kind that differs from the requested one
    pub kind_conflict: Option<NodeKind>,
}

/// What `get_or_create_edge` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeOutcome {
    pub id: EdgeId,
    pub created: bool,
    /// Stored qualifier, when the requested one disagrees with it
    pub qualifier_conflict: Option<EdgeQualifier>,
}

#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: BTreeMap<NodeId, Node>,
    node_ids_by_key: HashMap<CanonicalKey, NodeId>,
    edges: BTreeMap<EdgeId, Edge>,
    edge_ids_by_triple: HashMap<(EdgeKind, NodeId, NodeId), EdgeId>,
    /// Outgoing edges per node
    edges_from: HashMap<NodeId, BTreeSet<EdgeId>>,
    /// Incoming edges per node
    edges_to: HashMap<NodeId, BTreeSet<EdgeId>>,
    node_ids: IdAllocator,
    edge_ids: IdAllocator,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a node by key, creating it if absent.
    ///
    /// An explicit request clears the implicit flag of an existing node; an
    /// implicit request never sets it. A concrete kind refines an `Undefined`
    /// node. Any other kind mismatch keeps the existing kind and is reported
    /// through [`NodeOutcome::kind_conflict`].
    pub fn get_or_create_node(&mut self, kind: NodeKind, key: &CanonicalKey, implicit: bool) -> NodeOutcome {
        if let Some(&id) = self.node_ids_by_key.get(key) {
            let mut outcome = NodeOutcome {
                id,
                created: false,
                upgraded: false,
                kind_conflict: None,
            };
            if let Some(node) = self.nodes.get_mut(&id) {
                if node.implicit && !implicit {
                    node.implicit = false;
                    outcome.upgraded = true;
                }
                if !node.kind.is_defined() {
                    node.kind = kind;
                } else if kind.is_defined() && node.kind != kind {
                    outcome.kind_conflict = Some(node.kind);
                }
            }
            return outcome;
        }

        let id = NodeId(self.node_ids.allocate());
        tracing::debug!("Created {} {} {}", id, kind, key);
        self.nodes.insert(id, Node::new(id, kind, key.clone(), implicit));
        self.node_ids_by_key.insert(key.clone(), id);
        NodeOutcome {
            id,
            created: true,
            upgraded: false,
            kind_conflict: None,
        }
    }

    /// Look up an edge by `(kind, source, target)`, creating it if absent.
    ///
    /// The qualifier of the first occurrence is kept. Both endpoints must
    /// already exist; anything else is an internal invariant violation.
    pub fn get_or_create_edge(
        &mut self,
        kind: EdgeKind,
        source: NodeId,
        target: NodeId,
        qualifier: EdgeQualifier,
    ) -> Result<EdgeOutcome> {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(Error::OrphanEdge {
                    kind,
                    missing: endpoint,
                });
            }
        }

        if let Some(&id) = self.edge_ids_by_triple.get(&(kind, source, target)) {
            let qualifier_conflict = self
                .edges
                .get(&id)
                .filter(|edge| edge.qualifier.conflicts_with(&qualifier))
                .map(|edge| edge.qualifier.clone());
            return Ok(EdgeOutcome {
                id,
                created: false,
                qualifier_conflict,
            });
        }

        let id = EdgeId(self.edge_ids.allocate());
        tracing::debug!("Created {} {} {} -> {}", id, kind, source, target);
        self.edges.insert(id, Edge::new(id, kind, source, target, qualifier));
        self.edge_ids_by_triple.insert((kind, source, target), id);
        self.edges_from.entry(source).or_default().insert(id);
        self.edges_to.entry(target).or_default().insert(id);
        Ok(EdgeOutcome {
            id,
            created: true,
            qualifier_conflict: None,
        })
    }

    /// Remove an edge. Returns the removed record, if it existed.
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        self.edge_ids_by_triple.remove(&edge.triple());
        if let Some(out) = self.edges_from.get_mut(&edge.source) {
            out.remove(&id);
            if out.is_empty() {
                self.edges_from.remove(&edge.source);
            }
        }
        if let Some(inc) = self.edges_to.get_mut(&edge.target) {
            inc.remove(&id);
            if inc.is_empty() {
                self.edges_to.remove(&edge.target);
            }
        }
        self.edge_ids.release(id.get());
        Some(edge)
    }

    /// Remove a node no file justifies any more.
    ///
    /// Refuses (returns `false`) while any edge still touches the node, so
    /// callers must remove edges first.
    pub fn remove_node_if_orphaned(&mut self, id: NodeId) -> bool {
        if self.degree(id) > 0 {
            tracing::warn!("Keeping {}: still referenced by {} edge(s)", id, self.degree(id));
            return false;
        }
        let Some(node) = self.nodes.remove(&id) else {
            return false;
        };
        self.node_ids_by_key.remove(&node.key);
        self.node_ids.release(id.get());
        true
    }

    /// Overwrite the derived attributes of a surviving node after retraction.
    pub(crate) fn restore_node(&mut self, id: NodeId, kind: NodeKind, implicit: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = kind;
            node.implicit = implicit;
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_id(&self, key: &CanonicalKey) -> Option<NodeId> {
        self.node_ids_by_key.get(key).copied()
    }

    pub fn node_by_key(&self, key: &CanonicalKey) -> Option<&Node> {
        self.node_id(key).and_then(|id| self.nodes.get(&id))
    }

    pub fn edge_id(&self, kind: EdgeKind, source: NodeId, target: NodeId) -> Option<EdgeId> {
        self.edge_ids_by_triple.get(&(kind, source, target)).copied()
    }

    pub fn edges_from(&self, id: NodeId) -> Vec<&Edge> {
        self.edges_from
            .get(&id)
            .map(|ids| ids.iter().filter_map(|e| self.edges.get(e)).collect())
            .unwrap_or_default()
    }

    fn degree(&self, id: NodeId) -> usize {
        self.edges_from.get(&id).map_or(0, |s| s.len()) + self.edges_to.get(&id).map_or(0, |s| s.len())
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges in ascending id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Every edge's endpoints exist and no two nodes share a key.
    pub fn check_invariants(&self) -> bool {
        let endpoints_exist = self
            .edges
            .values()
            .all(|e| self.nodes.contains_key(&e.source) && self.nodes.contains_key(&e.target));
        endpoints_exist && self.node_ids_by_key.len() == self.nodes.len()
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_kind = BTreeMap::new();
        for node in self.nodes.values() {
            *nodes_by_kind.entry(node.kind).or_insert(0) += 1;
        }
        let mut edges_by_kind = BTreeMap::new();
        for edge in self.edges.values() {
            *edges_by_kind.entry(edge.kind).or_insert(0) += 1;
        }
        GraphStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            implicit_nodes: self.nodes.values().filter(|n| n.implicit).count(),
            nodes_by_kind,
            edges_by_kind,
        }
    }
}

/// Statistics about a graph store
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub implicit_nodes: usize,
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Symbol Graph Statistics:")?;
        writeln!(f, "  Nodes: {} (implicit: {})", self.total_nodes, self.implicit_nodes)?;
        for (kind, count) in &self.nodes_by_kind {
            writeln!(f, "    {}: {}", kind, count)?;
        }
        writeln!(f, "  Edges: {}", self.total_edges)?;
        for (kind, count) in &self.edges_by_kind {
            writeln!(f, "    {}: {}", kind, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::AccessKind;

    fn key(s: &str) -> CanonicalKey {
        CanonicalKey::from(s.to_string())
    }

    #[test]
    fn test_same_key_same_node() {
        let mut graph = GraphStore::new();
        let a = graph.get_or_create_node(NodeKind::Class, &key("Foo"), false);
        let b = graph.get_or_create_node(NodeKind::Class, &key("Foo"), false);
        assert!(a.created);
        assert!(!b.created);
        assert_eq!(a.id, b.id);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_implicit_upgrade_is_monotonic() {
        let mut graph = GraphStore::new();
        let first = graph.get_or_create_node(NodeKind::Method, &key("Foo::Foo"), true);
        assert!(graph.node(first.id).unwrap().implicit);

        let explicit = graph.get_or_create_node(NodeKind::Method, &key("Foo::Foo"), false);
        assert!(explicit.upgraded);
        assert!(!graph.node(first.id).unwrap().implicit);

        graph.get_or_create_node(NodeKind::Method, &key("Foo::Foo"), true);
        assert!(!graph.node(first.id).unwrap().implicit);
    }

    #[test]
    fn test_undefined_is_refined() {
        let mut graph = GraphStore::new();
        let fwd = graph.get_or_create_node(NodeKind::Undefined, &key("bar"), true);
        let decl = graph.get_or_create_node(NodeKind::Function, &key("bar"), false);
        assert_eq!(decl.kind_conflict, None);
        assert_eq!(graph.node(fwd.id).unwrap().kind, NodeKind::Function);

        let again = graph.get_or_create_node(NodeKind::Undefined, &key("bar"), true);
        assert_eq!(again.kind_conflict, None);
        assert_eq!(graph.node(fwd.id).unwrap().kind, NodeKind::Function);
    }

    #[test]
    fn test_kind_conflict_keeps_first() {
        let mut graph = GraphStore::new();
        let class = graph.get_or_create_node(NodeKind::Class, &key("X"), false);
        let ns = graph.get_or_create_node(NodeKind::Namespace, &key("X"), false);
        assert_eq!(ns.id, class.id);
        assert_eq!(ns.kind_conflict, Some(NodeKind::Class));
        assert_eq!(graph.node(class.id).unwrap().kind, NodeKind::Class);
    }

    #[test]
    fn test_edge_first_writer_wins() {
        let mut graph = GraphStore::new();
        let d = graph.get_or_create_node(NodeKind::Class, &key("D"), false).id;
        let b = graph.get_or_create_node(NodeKind::Class, &key("B"), false).id;

        let public = EdgeQualifier::Access { access: AccessKind::Public };
        let private = EdgeQualifier::Access { access: AccessKind::Private };
        let first = graph.get_or_create_edge(EdgeKind::Inheritance, d, b, public.clone()).unwrap();
        let second = graph.get_or_create_edge(EdgeKind::Inheritance, d, b, private).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.qualifier_conflict, Some(public.clone()));
        assert_eq!(graph.edge(first.id).unwrap().qualifier, public);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_orphan_edge_rejected() {
        let mut graph = GraphStore::new();
        let a = graph.get_or_create_node(NodeKind::Function, &key("a"), false).id;
        let err = graph.get_or_create_edge(EdgeKind::Call, a, NodeId(99), EdgeQualifier::None);
        assert!(matches!(err, Err(Error::OrphanEdge { .. })));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_node_removal_requires_edges_gone() {
        let mut graph = GraphStore::new();
        let a = graph.get_or_create_node(NodeKind::Function, &key("a"), false).id;
        let b = graph.get_or_create_node(NodeKind::Function, &key("b"), false).id;
        let e = graph.get_or_create_edge(EdgeKind::Call, a, b, EdgeQualifier::None).unwrap().id;

        assert!(!graph.remove_node_if_orphaned(b));
        assert!(graph.remove_edge(e).is_some());
        assert!(graph.remove_node_if_orphaned(b));
        assert!(graph.edges_from(a).is_empty());
        assert!(graph.node_by_key(&key("b")).is_none());
        assert!(graph.check_invariants());
    }

    #[test]
    fn test_released_ids_are_reused() {
        let mut graph = GraphStore::new();
        let a = graph.get_or_create_node(NodeKind::Function, &key("a"), false).id;
        assert!(graph.remove_node_if_orphaned(a));
        let again = graph.get_or_create_node(NodeKind::Function, &key("a2"), false).id;
        assert_eq!(a, again);
    }

    #[test]
    fn test_stats() {
        let mut graph = GraphStore::new();
        let a = graph.get_or_create_node(NodeKind::Function, &key("a"), false).id;
        let b = graph.get_or_create_node(NodeKind::Undefined, &key("b"), true).id;
        graph.get_or_create_edge(EdgeKind::Call, a, b, EdgeQualifier::None).unwrap();

        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.implicit_nodes, 1);
        assert_eq!(stats.edges_by_kind.get(&EdgeKind::Call), Some(&1));
    }
}
