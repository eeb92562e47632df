//! Shared ingestion state
//!
//! [`Engine`] owns the graph store, the location index and the file
//! lifecycle manager behind one lock. Every mutation an event causes happens
//! inside a single critical section, so a relationship's endpoint creation
//! and its edge are never observed separately.

use crate::edge::{Edge, EdgeKind, EdgeQualifier};
use crate::graph::{GraphStats, GraphStore};
use crate::id::{EdgeId, FileId, LocationId, NodeId};
use crate::ingest::event::{Declaration, Relationship, SymbolRef};
use crate::lifecycle::{FileLifecycleManager, RetractionReport};
use crate::location::{
    Diagnostic, DiagnosticKind, FileInfo, LocationIndex, LocationKind, ParseLocation, SourceFile, SourceLocation,
};
use crate::name::{canonicalize, AbstractionKind, AccessKind, CanonicalKey, QualifiedName, KEY_FORMAT_VERSION};
use crate::symbol::{Node, NodeKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Everything the engine mutates, guarded together.
#[derive(Debug, Default)]
pub struct GraphState {
    pub graph: GraphStore,
    pub locations: LocationIndex,
    pub files: FileLifecycleManager,
}

impl GraphState {
    fn path_of(&self, file: FileId) -> Option<String> {
        self.files.record(file).map(|r| r.path.clone())
    }

    pub(crate) fn diagnose(&mut self, file: Option<FileId>, diagnostic: Diagnostic) {
        let path = file.and_then(|f| self.path_of(f));
        let diagnostic = if diagnostic.path.is_none() {
            diagnostic.in_file(path.as_deref())
        } else {
            diagnostic
        };
        self.locations.record_diagnostic(diagnostic);
    }

    pub(crate) fn begin_file(&mut self, info: &FileInfo) -> Result<FileId> {
        self.files.begin_file(info, &mut self.graph, &mut self.locations)
    }

    pub(crate) fn end_file(&mut self, file: FileId) -> Result<()> {
        self.files.end_file(file, &mut self.locations)
    }

    pub(crate) fn retract(&mut self, file: FileId) -> RetractionReport {
        self.files.retract_file(file, &mut self.graph, &mut self.locations)
    }

    /// Apply a declaration event for `file`.
    pub(crate) fn declare(&mut self, file: FileId, kind: NodeKind, decl: &Declaration) -> NodeId {
        let modifiers = decl
            .name
            .modifiers
            .clone()
            .with_access(decl.access)
            .with_abstraction(decl.abstraction);
        let key = canonicalize(&decl.name, &modifiers);
        self.declare_key(file, kind, &key, decl.name.implicit, &decl.location, decl.scope_location.as_ref())
    }

    /// Apply a macro definition for `file`. Macros never carry access or
    /// abstraction.
    pub(crate) fn define_macro(
        &mut self,
        file: FileId,
        name: &QualifiedName,
        location: &ParseLocation,
        scope: Option<&ParseLocation>,
    ) -> NodeId {
        let modifiers = name
            .modifiers
            .clone()
            .with_access(AccessKind::None)
            .with_abstraction(AbstractionKind::None);
        let key = canonicalize(name, &modifiers);
        self.declare_key(file, NodeKind::Macro, &key, name.implicit, location, scope)
    }

    fn declare_key(
        &mut self,
        file: FileId,
        kind: NodeKind,
        key: &CanonicalKey,
        implicit: bool,
        location: &ParseLocation,
        scope: Option<&ParseLocation>,
    ) -> NodeId {
        let outcome = self.graph.get_or_create_node(kind, key, implicit);
        if let Some(existing) = outcome.kind_conflict {
            self.diagnose(
                Some(file),
                Diagnostic::new(
                    DiagnosticKind::AmbiguousName,
                    format!("'{}' declared as {} but already known as {}", key, kind, existing),
                )
                .at(Some(location)),
            );
        }

        let element = Some(outcome.id.into());
        self.locations.record_location(element, LocationKind::Token, location, file);
        if let Some(scope) = scope {
            self.locations.record_location(element, LocationKind::Scope, scope, file);
        }
        self.files.attribute_node(file, outcome.id, !implicit, kind);
        outcome.id
    }

    /// Whether an id reference points at a live node. Names always resolve.
    pub(crate) fn can_resolve(&self, symbol: &SymbolRef) -> bool {
        match symbol {
            SymbolRef::Id(id) => self.graph.contains_node(*id),
            SymbolRef::Name(_) => true,
        }
    }

    /// Find or forward-create a relationship endpoint. References never make
    /// a node explicit and never give it a kind; only declarations do.
    fn resolve(&mut self, file: FileId, symbol: &SymbolRef) -> Result<NodeId> {
        let id = match symbol {
            SymbolRef::Id(id) if self.graph.contains_node(*id) => *id,
            SymbolRef::Id(id) => return Err(Error::UnknownNode(*id)),
            SymbolRef::Name(name) => self.reference(&name.canonical_key(), name),
        };
        self.files.attribute_node(file, id, false, NodeKind::Undefined);
        Ok(id)
    }

    fn reference(&mut self, key: &CanonicalKey, name: &QualifiedName) -> NodeId {
        let outcome = self.graph.get_or_create_node(NodeKind::Undefined, key, true);
        if outcome.created {
            tracing::debug!("Forward-created {} for {}", outcome.id, name);
        }
        outcome.id
    }

    /// Apply a relationship event for `file`.
    ///
    /// Callers check [`GraphState::can_resolve`] for both endpoints first so
    /// that nothing is created for an event that cannot produce its edge.
    pub(crate) fn relate(&mut self, file: FileId, kind: EdgeKind, rel: &Relationship) -> Result<EdgeId> {
        let source = self.resolve(file, &rel.source)?;
        let target = self.resolve(file, &rel.target)?;

        let qualifier = match (kind, rel.access) {
            (EdgeKind::Inheritance, Some(access)) => EdgeQualifier::Access { access },
            _ => EdgeQualifier::None,
        };
        let edge = self.link(file, kind, source, target, qualifier, &rel.location)?;
        self.locations
            .record_location(Some(edge.into()), LocationKind::Token, &rel.location, file);
        Ok(edge)
    }

    /// Find or create an edge and attribute it to `file`. Locations are
    /// recorded by the caller.
    fn link(
        &mut self,
        file: FileId,
        kind: EdgeKind,
        source: NodeId,
        target: NodeId,
        qualifier: EdgeQualifier,
        location: &ParseLocation,
    ) -> Result<EdgeId> {
        let outcome = self.graph.get_or_create_edge(kind, source, target, qualifier.clone())?;
        if let Some(kept) = outcome.qualifier_conflict {
            self.diagnose(
                Some(file),
                Diagnostic::new(
                    DiagnosticKind::QualifierConflict,
                    format!("{} {} -> {} seen with {:?}, keeping {:?}", kind, source, target, qualifier, kept),
                )
                .at(Some(location)),
            );
        }
        self.files.attribute_edge(file, outcome.id);
        Ok(outcome.id)
    }

    /// Register metadata for a file the front end reports as parsed.
    pub(crate) fn file_parsed(&mut self, file: FileId, info: &FileInfo) -> FileId {
        let node = self
            .graph
            .get_or_create_node(NodeKind::File, &CanonicalKey::for_file(&info.path), false)
            .id;
        let id = self.locations.record_file(info, node);
        self.files.attribute_node(file, node, true, NodeKind::File);
        id
    }

    fn file_node(&mut self, file: FileId, info: &FileInfo) -> NodeId {
        let node = self
            .graph
            .get_or_create_node(NodeKind::File, &CanonicalKey::for_file(&info.path), true)
            .id;
        self.locations.record_file(info, node);
        self.files.attribute_node(file, node, false, NodeKind::File);
        node
    }

    /// Add an include edge. Only the including side's ingestion owns it,
    /// whichever file is currently open.
    pub(crate) fn include(
        &mut self,
        file: FileId,
        location: &ParseLocation,
        from: &FileInfo,
        included: &FileInfo,
    ) -> Result<EdgeId> {
        let source = self.file_node(file, from);
        let target = self.file_node(file, included);
        let edge = self.link(file, EdgeKind::Include, source, target, EdgeQualifier::None, location)?;
        self.locations.record_include(edge, location, file);
        Ok(edge)
    }

    /// Add a macro use edge from the current file to the expanded macro.
    pub(crate) fn expand_macro(&mut self, file: FileId, name: &QualifiedName, location: &ParseLocation) -> Result<EdgeId> {
        let source = self
            .locations
            .file(file)
            .map(|f| f.node)
            .ok_or_else(|| Error::UnknownFile(file.to_string()))?;
        let modifiers = name
            .modifiers
            .clone()
            .with_access(AccessKind::None)
            .with_abstraction(AbstractionKind::None);
        let target = self.reference(&canonicalize(name, &modifiers), name);
        self.files.attribute_node(file, target, false, NodeKind::Undefined);
        let edge = self.link(file, EdgeKind::MacroUse, source, target, EdgeQualifier::None, location)?;
        self.locations
            .record_location(Some(edge.into()), LocationKind::Token, location, file);
        Ok(edge)
    }

    pub(crate) fn comment(&mut self, file: FileId, location: &ParseLocation) -> Option<LocationId> {
        self.locations.record_location(None, LocationKind::Comment, location, file)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            key_format_version: KEY_FORMAT_VERSION,
            nodes: self.graph.nodes().cloned().collect(),
            edges: self.graph.edges().cloned().collect(),
            files: self.locations.files().cloned().collect(),
            locations: self.locations.locations().cloned().collect(),
            diagnostics: self.locations.diagnostics().to_vec(),
        }
    }
}

/// The finished graph handed to a storage sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub key_format_version: u32,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub files: Vec<SourceFile>,
    pub locations: Vec<SourceLocation>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The ingestion engine shared by all workers of a run.
#[derive(Debug, Default)]
pub struct Engine {
    state: Mutex<GraphState>,
    cancelled: AtomicBool,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, GraphState>> {
        self.state.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Run `f` inside the engine's critical section.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut GraphState) -> T) -> Result<T> {
        let mut state = self.lock()?;
        Ok(f(&mut state))
    }

    /// Abort the run. Workers retract their in-flight file at their next
    /// event and drop everything after it.
    pub fn cancel(&self) {
        tracing::info!("Ingestion cancelled");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Retract a closed file by path. Unknown paths are a no-op.
    pub fn retract_file(&self, path: &str) -> Result<RetractionReport> {
        let mut state = self.lock()?;
        let Some(record) = state.files.record_for_path(path).cloned() else {
            return Ok(RetractionReport::default());
        };
        if state.files.is_open(record.id) {
            return Err(Error::FileAlreadyOpen(path.to_string()));
        }
        Ok(state.retract(record.id))
    }

    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        Ok(self.lock()?.snapshot())
    }

    pub fn stats(&self) -> Result<GraphStats> {
        Ok(self.lock()?.graph.stats())
    }

    pub fn diagnostics(&self) -> Result<Vec<Diagnostic>> {
        Ok(self.lock()?.locations.diagnostics().to_vec())
    }

    pub fn node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.lock()?.graph.node(id).cloned())
    }

    /// Look up the node a name (with the modifiers it carries) resolves to.
    pub fn find_node(&self, name: &QualifiedName) -> Result<Option<Node>> {
        Ok(self.lock()?.graph.node_by_key(&name.canonical_key()).cloned())
    }

    pub fn find_edge(&self, kind: EdgeKind, source: NodeId, target: NodeId) -> Result<Option<Edge>> {
        let state = self.lock()?;
        Ok(state
            .graph
            .edge_id(kind, source, target)
            .and_then(|id| state.graph.edge(id))
            .cloned())
    }

    /// Paths of the files whose ingestion currently justifies `node`.
    pub fn node_contributors(&self, node: NodeId) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .files
            .node_contributors(node)
            .into_iter()
            .filter_map(|file| state.files.record(file).map(|r| r.path.clone()))
            .collect())
    }

    pub fn check_invariants(&self) -> Result<bool> {
        Ok(self.lock()?.graph.check_invariants())
    }
}
