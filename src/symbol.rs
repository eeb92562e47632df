//! Node types
//!
//! Every symbol a front end reports becomes a [`Node`] tagged with one of
//! the closed set of [`NodeKind`]s. Nodes forward-created by a relationship
//! start out as [`NodeKind::Undefined`] until a declaration names their kind.

use crate::id::NodeId;
use crate::name::CanonicalKey;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Referenced by a relationship, kind not known yet
    Undefined,
    Typedef,
    Class,
    Struct,
    GlobalVariable,
    Field,
    Function,
    Method,
    Namespace,
    Enum,
    EnumConstant,
    TemplateParameterType,
    File,
    Macro,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Undefined => "undefined",
            NodeKind::Typedef => "typedef",
            NodeKind::Class => "class",
            NodeKind::Struct => "struct",
            NodeKind::GlobalVariable => "global_variable",
            NodeKind::Field => "field",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Namespace => "namespace",
            NodeKind::Enum => "enum",
            NodeKind::EnumConstant => "enum_constant",
            NodeKind::TemplateParameterType => "template_parameter_type",
            NodeKind::File => "file",
            NodeKind::Macro => "macro",
        }
    }

    pub fn all() -> &'static [NodeKind] {
        &[
            NodeKind::Undefined,
            NodeKind::Typedef,
            NodeKind::Class,
            NodeKind::Struct,
            NodeKind::GlobalVariable,
            NodeKind::Field,
            NodeKind::Function,
            NodeKind::Method,
            NodeKind::Namespace,
            NodeKind::Enum,
            NodeKind::EnumConstant,
            NodeKind::TemplateParameterType,
            NodeKind::File,
            NodeKind::Macro,
        ]
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, NodeKind::Undefined)
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NodeKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.to_lowercase())
            .ok_or_else(|| Error::InvalidKind(format!("Unknown node kind: {}", s)))
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node in the symbol graph.
///
/// Only the graph store creates nodes, always through find-or-create on the
/// canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub key: CanonicalKey,
    /// Inferred rather than written in source (e.g. a generated constructor)
    pub implicit: bool,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind, key: CanonicalKey, implicit: bool) -> Self {
        Self { id, kind, key, implicit }
    }

    pub fn short_description(&self) -> String {
        if self.implicit {
            format!("{} {} (implicit)", self.kind, self.key)
        } else {
            format!("{} {}", self.kind, self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_roundtrip() {
        for kind in NodeKind::all() {
            let parsed: NodeKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_unknown_kind() {
        assert!(NodeKind::from_str("trait").is_err());
    }

    #[test]
    fn test_short_description() {
        let node = Node::new(NodeId(1), NodeKind::Method, "Foo::Foo".to_string().into(), true);
        assert_eq!(node.short_description(), "method Foo::Foo (implicit)");
        assert!(!NodeKind::Undefined.is_defined());
    }
}
