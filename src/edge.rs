//! Edge types
//!
//! Relationships between nodes. An edge is identified by its
//! `(kind, source, target)` triple; the qualifier is whatever the first
//! occurrence reported.

use crate::id::{EdgeId, NodeId};
use crate::name::AccessKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Inheritance,
    Override,
    Call,
    FieldUsage,
    GlobalVariableUsage,
    EnumConstantUsage,
    TypeUsage,
    TemplateArgument,
    TemplateDefaultArgument,
    TemplateSpecialization,
    TemplateMemberSpecialization,
    Include,
    MacroUse,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Inheritance => "inheritance",
            EdgeKind::Override => "override",
            EdgeKind::Call => "call",
            EdgeKind::FieldUsage => "field_usage",
            EdgeKind::GlobalVariableUsage => "global_variable_usage",
            EdgeKind::EnumConstantUsage => "enum_constant_usage",
            EdgeKind::TypeUsage => "type_usage",
            EdgeKind::TemplateArgument => "template_argument",
            EdgeKind::TemplateDefaultArgument => "template_default_argument",
            EdgeKind::TemplateSpecialization => "template_specialization",
            EdgeKind::TemplateMemberSpecialization => "template_member_specialization",
            EdgeKind::Include => "include",
            EdgeKind::MacroUse => "macro_use",
        }
    }

    pub fn all() -> &'static [EdgeKind] {
        &[
            EdgeKind::Inheritance,
            EdgeKind::Override,
            EdgeKind::Call,
            EdgeKind::FieldUsage,
            EdgeKind::GlobalVariableUsage,
            EdgeKind::EnumConstantUsage,
            EdgeKind::TypeUsage,
            EdgeKind::TemplateArgument,
            EdgeKind::TemplateDefaultArgument,
            EdgeKind::TemplateSpecialization,
            EdgeKind::TemplateMemberSpecialization,
            EdgeKind::Include,
            EdgeKind::MacroUse,
        ]
    }
}

impl FromStr for EdgeKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.to_lowercase())
            .ok_or_else(|| crate::Error::InvalidKind(format!("Unknown edge kind: {}", s)))
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extra information recorded with the first occurrence of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeQualifier {
    #[default]
    None,
    /// Inheritance access
    Access { access: AccessKind },
}

impl EdgeQualifier {
    /// Whether a later occurrence genuinely disagrees with this one.
    ///
    /// Only two different access levels disagree.
    pub fn conflicts_with(&self, other: &EdgeQualifier) -> bool {
        match (self, other) {
            (EdgeQualifier::Access { access: a }, EdgeQualifier::Access { access: b }) => a != b,
            _ => false,
        }
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub kind: EdgeKind,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub qualifier: EdgeQualifier,
}

impl Edge {
    pub(crate) fn new(id: EdgeId, kind: EdgeKind, source: NodeId, target: NodeId, qualifier: EdgeQualifier) -> Self {
        Self { id, kind, source, target, qualifier }
    }

    /// The dedup identity of this edge.
    pub fn triple(&self) -> (EdgeKind, NodeId, NodeId) {
        (self.kind, self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_roundtrip() {
        for kind in EdgeKind::all() {
            let parsed: EdgeKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_qualifier_conflicts() {
        let public = EdgeQualifier::Access { access: AccessKind::Public };
        let private = EdgeQualifier::Access { access: AccessKind::Private };
        assert!(public.conflicts_with(&private));
        assert!(!public.conflicts_with(&public));
        assert!(!EdgeQualifier::None.conflicts_with(&public));
    }

    #[test]
    fn test_triple() {
        let edge = Edge::new(EdgeId(1), EdgeKind::Call, NodeId(2), NodeId(3), EdgeQualifier::None);
        assert_eq!(edge.triple(), (EdgeKind::Call, NodeId(2), NodeId(3)));
    }
}
