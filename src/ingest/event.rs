//! Parse events
//!
//! The single tagged type front ends use to talk to the engine. Because it is
//! plain data, an analysis run can be written to a JSON Lines log and
//! replayed later.

use crate::edge::EdgeKind;
use crate::id::NodeId;
use crate::location::{FileInfo, ParseLocation};
use crate::name::{AbstractionKind, AccessKind, QualifiedName};
use crate::symbol::NodeKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// Endpoint of a relationship: a full name, or an id an earlier declaration
/// event returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolRef {
    Id(NodeId),
    Name(QualifiedName),
}

impl From<QualifiedName> for SymbolRef {
    fn from(name: QualifiedName) -> Self {
        SymbolRef::Name(name)
    }
}

impl From<NodeId> for SymbolRef {
    fn from(id: NodeId) -> Self {
        SymbolRef::Id(id)
    }
}

impl std::fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolRef::Id(id) => write!(f, "{}", id),
            SymbolRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Payload shared by every declaration event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(default)]
    pub location: ParseLocation,
    pub name: QualifiedName,
    #[serde(default)]
    pub access: AccessKind,
    #[serde(default)]
    pub abstraction: AbstractionKind,
    /// Extent of the declaration's body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_location: Option<ParseLocation>,
}

impl Declaration {
    pub fn new(name: QualifiedName, location: ParseLocation) -> Self {
        Self {
            location,
            name,
            access: AccessKind::None,
            abstraction: AbstractionKind::None,
            scope_location: None,
        }
    }

    pub fn with_access(mut self, access: AccessKind) -> Self {
        self.access = access;
        self
    }

    pub fn with_abstraction(mut self, abstraction: AbstractionKind) -> Self {
        self.abstraction = abstraction;
        self
    }

    pub fn with_scope(mut self, scope: ParseLocation) -> Self {
        self.scope_location = Some(scope);
        self
    }
}

/// Payload shared by every relationship event.
///
/// `source` and `target` follow the edge direction of the event kind, e.g.
/// caller and callee, derived class and base, user and used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub location: ParseLocation,
    pub source: SymbolRef,
    pub target: SymbolRef,
    /// Inheritance access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessKind>,
}

impl Relationship {
    pub fn new(source: impl Into<SymbolRef>, target: impl Into<SymbolRef>, location: ParseLocation) -> Self {
        Self {
            location,
            source: source.into(),
            target: target.into(),
            access: None,
        }
    }

    pub fn with_access(mut self, access: AccessKind) -> Self {
        self.access = Some(access);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ParseEvent {
    StartParsing,
    FinishParsing,
    StartParsingFile {
        file: FileInfo,
    },
    FinishParsingFile {
        path: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<ParseLocation>,
        message: String,
        #[serde(default)]
        fatal: bool,
    },

    Typedef(Declaration),
    Class(Declaration),
    Struct(Declaration),
    GlobalVariable(Declaration),
    Field(Declaration),
    Function(Declaration),
    Method(Declaration),
    Namespace(Declaration),
    Enum(Declaration),
    EnumConstant(Declaration),
    TemplateParameterType(Declaration),

    Inheritance(Relationship),
    MethodOverride(Relationship),
    Call(Relationship),
    FieldUsage(Relationship),
    GlobalVariableUsage(Relationship),
    EnumConstantUsage(Relationship),
    TypeUsage(Relationship),
    TemplateArgumentType(Relationship),
    TemplateDefaultArgumentType(Relationship),
    TemplateSpecialization(Relationship),
    TemplateMemberSpecialization(Relationship),

    FileParsed {
        file: FileInfo,
    },
    FileInclude {
        #[serde(default)]
        location: ParseLocation,
        file: FileInfo,
        included: FileInfo,
    },
    MacroDefine {
        #[serde(default)]
        location: ParseLocation,
        name: QualifiedName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope_location: Option<ParseLocation>,
    },
    MacroExpand {
        #[serde(default)]
        location: ParseLocation,
        name: QualifiedName,
    },
    Comment {
        location: ParseLocation,
    },
}

impl ParseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ParseEvent::StartParsing => "start_parsing",
            ParseEvent::FinishParsing => "finish_parsing",
            ParseEvent::StartParsingFile { .. } => "start_parsing_file",
            ParseEvent::FinishParsingFile { .. } => "finish_parsing_file",
            ParseEvent::Error { .. } => "error",
            ParseEvent::FileParsed { .. } => "file_parsed",
            ParseEvent::FileInclude { .. } => "file_include",
            ParseEvent::MacroDefine { .. } => "macro_define",
            ParseEvent::MacroExpand { .. } => "macro_expand",
            ParseEvent::Comment { .. } => "comment",
            other => match (other.declaration(), other.relationship()) {
                (Some((kind, _)), _) => kind.as_str(),
                (_, Some((kind, _))) => kind.as_str(),
                _ => "unknown",
            },
        }
    }

    /// Node kind and payload of a declaration event.
    pub fn declaration(&self) -> Option<(NodeKind, &Declaration)> {
        let kind = match self {
            ParseEvent::Typedef(_) => NodeKind::Typedef,
            ParseEvent::Class(_) => NodeKind::Class,
            ParseEvent::Struct(_) => NodeKind::Struct,
            ParseEvent::GlobalVariable(_) => NodeKind::GlobalVariable,
            ParseEvent::Field(_) => NodeKind::Field,
            ParseEvent::Function(_) => NodeKind::Function,
            ParseEvent::Method(_) => NodeKind::Method,
            ParseEvent::Namespace(_) => NodeKind::Namespace,
            ParseEvent::Enum(_) => NodeKind::Enum,
            ParseEvent::EnumConstant(_) => NodeKind::EnumConstant,
            ParseEvent::TemplateParameterType(_) => NodeKind::TemplateParameterType,
            _ => return None,
        };
        match self {
            ParseEvent::Typedef(d)
            | ParseEvent::Class(d)
            | ParseEvent::Struct(d)
            | ParseEvent::GlobalVariable(d)
            | ParseEvent::Field(d)
            | ParseEvent::Function(d)
            | ParseEvent::Method(d)
            | ParseEvent::Namespace(d)
            | ParseEvent::Enum(d)
            | ParseEvent::EnumConstant(d)
            | ParseEvent::TemplateParameterType(d) => Some((kind, d)),
            _ => None,
        }
    }

    /// Edge kind and payload of a relationship event.
    pub fn relationship(&self) -> Option<(EdgeKind, &Relationship)> {
        match self {
            ParseEvent::Inheritance(r) => Some((EdgeKind::Inheritance, r)),
            ParseEvent::MethodOverride(r) => Some((EdgeKind::Override, r)),
            ParseEvent::Call(r) => Some((EdgeKind::Call, r)),
            ParseEvent::FieldUsage(r) => Some((EdgeKind::FieldUsage, r)),
            ParseEvent::GlobalVariableUsage(r) => Some((EdgeKind::GlobalVariableUsage, r)),
            ParseEvent::EnumConstantUsage(r) => Some((EdgeKind::EnumConstantUsage, r)),
            ParseEvent::TypeUsage(r) => Some((EdgeKind::TypeUsage, r)),
            ParseEvent::TemplateArgumentType(r) => Some((EdgeKind::TemplateArgument, r)),
            ParseEvent::TemplateDefaultArgumentType(r) => Some((EdgeKind::TemplateDefaultArgument, r)),
            ParseEvent::TemplateSpecialization(r) => Some((EdgeKind::TemplateSpecialization, r)),
            ParseEvent::TemplateMemberSpecialization(r) => Some((EdgeKind::TemplateMemberSpecialization, r)),
            _ => None,
        }
    }

    /// Source location the event points at, if it carries one.
    pub fn location(&self) -> Option<&ParseLocation> {
        if let Some((_, d)) = self.declaration() {
            return Some(&d.location);
        }
        if let Some((_, r)) = self.relationship() {
            return Some(&r.location);
        }
        match self {
            ParseEvent::Error { location, .. } => location.as_ref(),
            ParseEvent::FileInclude { location, .. }
            | ParseEvent::MacroDefine { location, .. }
            | ParseEvent::MacroExpand { location, .. }
            | ParseEvent::Comment { location } => Some(location),
            _ => None,
        }
    }
}

/// Read a JSON Lines event log. Blank lines are skipped.
pub fn read_events(reader: impl BufRead) -> Result<Vec<ParseEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| Error::InvalidEvent {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Write events as JSON Lines.
pub fn write_events<'a>(mut writer: impl Write, events: impl IntoIterator<Item = &'a ParseEvent>) -> Result<()> {
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_json_shape() {
        let event = ParseEvent::Class(
            Declaration::new(QualifiedName::from_path("ns::Foo"), ParseLocation::new("a.cpp", 3, 7, 3, 9))
                .with_access(AccessKind::Public),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "class");
        assert_eq!(json["access"], "public");
        assert_eq!(json["name"]["components"][1]["name"], "Foo");
    }

    #[test]
    fn test_symbol_ref_accepts_id_or_name() {
        let line = r#"{"event":"call","source":4,"target":{"components":[{"name":"bar"}]}}"#;
        let event: ParseEvent = serde_json::from_str(line).unwrap();
        let (kind, rel) = event.relationship().unwrap();
        assert_eq!(kind, EdgeKind::Call);
        assert_eq!(rel.source, SymbolRef::Id(NodeId(4)));
        assert_eq!(rel.target, SymbolRef::Name(QualifiedName::from_path("bar")));
        assert!(!rel.location.is_valid());
    }

    #[test]
    fn test_read_events_reports_line() {
        let log = "{\"event\":\"start_parsing\"}\n\n{\"event\":\"bogus\"}\n";
        let err = read_events(log.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { line: 3, .. }));
    }

    #[test]
    fn test_write_then_read_log() {
        let events = vec![
            ParseEvent::StartParsing,
            ParseEvent::StartParsingFile { file: FileInfo::new("a.cpp") },
            ParseEvent::Error {
                location: None,
                message: "boom".to_string(),
                fatal: true,
            },
            ParseEvent::FinishParsingFile { path: "a.cpp".to_string() },
            ParseEvent::FinishParsing,
        ];
        let mut buf = Vec::new();
        write_events(&mut buf, &events).unwrap();
        assert_eq!(read_events(buf.as_slice()).unwrap(), events);
    }

    #[test]
    fn test_event_names() {
        let decl = ParseEvent::Method(Declaration::new(QualifiedName::from_path("A::f"), ParseLocation::default()));
        assert_eq!(decl.name(), "method");
        let rel = ParseEvent::MethodOverride(Relationship::new(NodeId(1), NodeId(2), ParseLocation::default()));
        assert_eq!(rel.name(), "override");
        assert_eq!(ParseEvent::StartParsing.name(), "start_parsing");
    }
}
