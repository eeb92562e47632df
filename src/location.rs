//! Location Index - source ranges, file records and diagnostics
//!
//! Every recorded [`SourceLocation`] is owned by exactly one file: the file
//! whose ingestion recorded it. Retraction asks the index for everything a
//! file owns. Diagnostics live in a parallel list and never become graph
//! elements.

use crate::config::Language;
use crate::id::{EdgeId, ElementId, FileId, IdAllocator, LocationId, NodeId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

/// A source range as reported by a front end. Lines and columns are 1-based;
/// a zero start line marks an absent location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ParseLocation {
    pub path: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl ParseLocation {
    pub fn new(path: impl Into<String>, start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            path: path.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start_line > 0 && !self.path.is_empty()
    }

    /// `path:line:col` of the start position.
    pub fn short_form(&self) -> String {
        format!("{}:{}:{}", self.path, self.start_line, self.start_column)
    }
}

impl fmt::Display for ParseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.path, self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// Metadata a front end reports for a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Content hash used to detect modification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl FileInfo {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let language = Language::from_path(Path::new(&path));
        Self {
            path,
            language,
            fingerprint: None,
        }
    }

    /// Read the file and fingerprint its content.
    pub fn from_disk(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(Self {
            path: path.to_string_lossy().to_string(),
            language: Language::from_path(path),
            fingerprint: Some(blake3::hash(&content).to_string()),
        })
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Fill in whatever `other` knows that this record does not.
    fn merge(&mut self, other: &FileInfo) {
        if other.language.is_some() {
            self.language = other.language;
        }
        if other.fingerprint.is_some() {
            self.fingerprint = other.fingerprint.clone();
        }
    }
}

/// A file known to the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: FileId,
    /// The file's node in the graph
    pub node: NodeId,
    pub info: FileInfo,
    /// Set once the file's own event stream finished successfully
    pub indexed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Where a symbol or relationship is written
    Token,
    /// The extent of a declaration's body
    Scope,
    /// An include directive
    Include,
    /// A comment, kept for documentation extraction
    Comment,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Token => "token",
            LocationKind::Scope => "scope",
            LocationKind::Include => "include",
            LocationKind::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub id: LocationId,
    pub kind: LocationKind,
    /// Annotated element; `None` for comments
    pub element: Option<ElementId>,
    /// File whose ingestion recorded this location
    pub owner: FileId,
    pub range: ParseLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Reported by the front end through `on_error`
    Parser,
    /// Event arrived in a state that does not accept it
    ProtocolViolation,
    /// Key already bound to a node of another kind
    AmbiguousName,
    /// Edge seen again with a different access qualifier
    QualifierConflict,
    /// Dropped because the run was cancelled
    Cancelled,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Parser => "parser",
            DiagnosticKind::ProtocolViolation => "protocol_violation",
            DiagnosticKind::AmbiguousName => "ambiguous_name",
            DiagnosticKind::QualifierConflict => "qualifier_conflict",
            DiagnosticKind::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for DiagnosticKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "parser" => Ok(DiagnosticKind::Parser),
            "protocol_violation" => Ok(DiagnosticKind::ProtocolViolation),
            "ambiguous_name" => Ok(DiagnosticKind::AmbiguousName),
            "qualifier_conflict" => Ok(DiagnosticKind::QualifierConflict),
            "cancelled" => Ok(DiagnosticKind::Cancelled),
            _ => Err(crate::Error::InvalidKind(format!("Unknown diagnostic kind: {}", s))),
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ParseLocation>,
    /// File being ingested when the diagnostic was raised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    pub fatal: bool,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            location: None,
            path: None,
            message: message.into(),
            fatal: false,
        }
    }

    pub fn at(mut self, location: Option<&ParseLocation>) -> Self {
        self.location = location.filter(|l| l.is_valid()).cloned();
        self
    }

    pub fn in_file(mut self, path: Option<&str>) -> Self {
        self.path = path.map(str::to_string);
        self
    }

    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.fatal { "fatal" } else { "error" };
        match (&self.location, &self.path) {
            (Some(loc), _) => write!(f, "{} [{}] {}: {}", severity, self.kind, loc, self.message),
            (None, Some(path)) => write!(f, "{} [{}] {}: {}", severity, self.kind, path, self.message),
            (None, None) => write!(f, "{} [{}] {}", severity, self.kind, self.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct LocationIndex {
    files: BTreeMap<FileId, SourceFile>,
    file_ids_by_path: HashMap<String, FileId>,
    locations: BTreeMap<LocationId, SourceLocation>,
    by_owner: HashMap<FileId, BTreeSet<LocationId>>,
    by_element: HashMap<ElementId, BTreeSet<LocationId>>,
    diagnostics: Vec<Diagnostic>,
    file_ids: IdAllocator,
    location_ids: IdAllocator,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Files ==========

    /// Register a file, or merge new metadata into an already known one.
    pub fn record_file(&mut self, info: &FileInfo, node: NodeId) -> FileId {
        if let Some(&id) = self.file_ids_by_path.get(&info.path) {
            if let Some(file) = self.files.get_mut(&id) {
                file.info.merge(info);
                file.node = node;
            }
            return id;
        }

        let id = FileId(self.file_ids.allocate());
        self.files.insert(
            id,
            SourceFile {
                id,
                node,
                info: info.clone(),
                indexed: false,
            },
        );
        self.file_ids_by_path.insert(info.path.clone(), id);
        id
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(&id)
    }

    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.file_ids_by_path.get(path).copied()
    }

    pub fn set_indexed(&mut self, id: FileId, indexed: bool) {
        if let Some(file) = self.files.get_mut(&id) {
            file.indexed = indexed;
        }
    }

    /// Drop file records whose node no longer exists in the graph.
    pub fn prune_files(&mut self, node_exists: impl Fn(NodeId) -> bool) -> Vec<FileId> {
        let dead: Vec<FileId> = self
            .files
            .values()
            .filter(|f| !node_exists(f.node))
            .map(|f| f.id)
            .collect();
        for id in &dead {
            if let Some(file) = self.files.remove(id) {
                self.file_ids_by_path.remove(&file.info.path);
                self.file_ids.release(id.get());
            }
        }
        dead
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    // ========== Locations ==========

    /// Record a range for an element. Absent ranges are skipped.
    pub fn record_location(
        &mut self,
        element: Option<ElementId>,
        kind: LocationKind,
        range: &ParseLocation,
        owner: FileId,
    ) -> Option<LocationId> {
        if !range.is_valid() {
            return None;
        }
        let id = LocationId(self.location_ids.allocate());
        self.locations.insert(
            id,
            SourceLocation {
                id,
                kind,
                element,
                owner,
                range: range.clone(),
            },
        );
        self.by_owner.entry(owner).or_default().insert(id);
        if let Some(element) = element {
            self.by_element.entry(element).or_default().insert(id);
        }
        Some(id)
    }

    /// Record where an include directive sits.
    pub fn record_include(&mut self, edge: EdgeId, at: &ParseLocation, owner: FileId) -> Option<LocationId> {
        self.record_location(Some(ElementId::Edge(edge)), LocationKind::Include, at, owner)
    }

    pub fn location(&self, id: LocationId) -> Option<&SourceLocation> {
        self.locations.get(&id)
    }

    pub fn locations_of(&self, element: ElementId) -> Vec<&SourceLocation> {
        self.by_element
            .get(&element)
            .map(|ids| ids.iter().filter_map(|id| self.locations.get(id)).collect())
            .unwrap_or_default()
    }

    /// Remove every location a file recorded. Returns how many were removed.
    pub fn remove_owned_by(&mut self, owner: FileId) -> usize {
        let Some(ids) = self.by_owner.remove(&owner) else {
            return 0;
        };
        for id in &ids {
            if let Some(location) = self.locations.remove(id) {
                if let Some(element) = location.element {
                    if let Some(set) = self.by_element.get_mut(&element) {
                        set.remove(id);
                        if set.is_empty() {
                            self.by_element.remove(&element);
                        }
                    }
                }
            }
            self.location_ids.release(id.get());
        }
        ids.len()
    }

    pub fn locations(&self) -> impl Iterator<Item = &SourceLocation> {
        self.locations.values()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    // ========== Diagnostics ==========

    pub fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// Forget diagnostics raised while ingesting `path` in an earlier pass.
    pub fn clear_diagnostics_for(&mut self, path: &str) {
        self.diagnostics.retain(|d| d.path.as_deref() != Some(path));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(path: &str, line: u32) -> ParseLocation {
        ParseLocation::new(path, line, 1, line, 10)
    }

    #[test]
    fn test_record_file_is_idempotent() {
        let mut index = LocationIndex::new();
        let a = index.record_file(&FileInfo::new("src/a.cpp"), NodeId(1));
        let b = index.record_file(&FileInfo::new("src/a.cpp").with_fingerprint("abc"), NodeId(1));
        assert_eq!(a, b);
        let file = index.file(a).unwrap();
        assert_eq!(file.info.fingerprint.as_deref(), Some("abc"));
        assert_eq!(file.info.language, Some(Language::Cpp));
    }

    #[test]
    fn test_invalid_range_is_skipped() {
        let mut index = LocationIndex::new();
        let owner = index.record_file(&FileInfo::new("a.c"), NodeId(1));
        let none = index.record_location(None, LocationKind::Comment, &ParseLocation::default(), owner);
        assert!(none.is_none());
        assert_eq!(index.location_count(), 0);
    }

    #[test]
    fn test_remove_owned_by_keeps_other_owners() {
        let mut index = LocationIndex::new();
        let a = index.record_file(&FileInfo::new("a.cpp"), NodeId(1));
        let b = index.record_file(&FileInfo::new("b.cpp"), NodeId(2));
        let node = Some(ElementId::Node(NodeId(3)));

        index.record_location(node, LocationKind::Token, &range("util.h", 4), a);
        index.record_location(node, LocationKind::Token, &range("util.h", 4), b);
        index.record_location(None, LocationKind::Comment, &range("a.cpp", 1), a);

        assert_eq!(index.remove_owned_by(a), 2);
        let remaining = index.locations_of(ElementId::Node(NodeId(3)));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].owner, b);
        assert_eq!(index.remove_owned_by(a), 0);
    }

    #[test]
    fn test_prune_files() {
        let mut index = LocationIndex::new();
        let a = index.record_file(&FileInfo::new("a.cpp"), NodeId(1));
        index.record_file(&FileInfo::new("b.h"), NodeId(2));
        let pruned = index.prune_files(|node| node == NodeId(1));
        assert_eq!(pruned.len(), 1);
        assert!(index.file_id("b.h").is_none());
        assert_eq!(index.file_id("a.cpp"), Some(a));
    }

    #[test]
    fn test_diagnostics_cleared_per_file() {
        let mut index = LocationIndex::new();
        index.record_diagnostic(Diagnostic::new(DiagnosticKind::Parser, "oops").in_file(Some("a.cpp")));
        index.record_diagnostic(Diagnostic::new(DiagnosticKind::Parser, "bad").in_file(Some("b.cpp")));
        index.clear_diagnostics_for("a.cpp");
        assert_eq!(index.diagnostics().len(), 1);
        assert_eq!(index.diagnostics()[0].message, "bad");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::new(DiagnosticKind::Parser, "expected ';'")
            .at(Some(&range("a.cpp", 7)))
            .fatal(true);
        assert_eq!(diag.to_string(), "fatal [parser] a.cpp:7:1-7:10: expected ';'");
    }
}
