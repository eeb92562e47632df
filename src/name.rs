//! Qualified names and canonical keys
//!
//! A [`QualifiedName`] is the hierarchical name a front end reports for a
//! symbol. Folding it together with its [`Modifiers`] yields a
//! [`CanonicalKey`], the string that decides node identity in the graph.
//!
//! Key layout (format version [`KEY_FORMAT_VERSION`]):
//!
//! ```text
//! [access ][abstraction ][static ][const ]<a::b::c>[ const][ <path:line:col[|path:line:col]>]
//! ```
//!
//! Changing the composition order changes every key, so it invalidates any
//! graph persisted with an older version.
//!
//! Access and abstraction are part of identity. A declaration event folds its
//! own access level into the key, so a relationship endpoint only reaches
//! that node when its name carries the same access in its [`Modifiers`];
//! a bare `Foo` and `public Foo` are different nodes.

use crate::location::ParseLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the canonical key layout.
pub const KEY_FORMAT_VERSION: u32 = 1;

/// Separator placed between name components.
pub const NAME_DELIMITER: &str = "::";

/// Access level of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Public,
    Protected,
    Private,
    #[default]
    None,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Public => "public",
            AccessKind::Protected => "protected",
            AccessKind::Private => "private",
            AccessKind::None => "none",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            AccessKind::Public => "public ",
            AccessKind::Protected => "protected ",
            AccessKind::Private => "private ",
            AccessKind::None => "",
        }
    }
}

impl FromStr for AccessKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "public" => Ok(AccessKind::Public),
            "protected" => Ok(AccessKind::Protected),
            "private" => Ok(AccessKind::Private),
            "none" | "" => Ok(AccessKind::None),
            _ => Err(crate::Error::InvalidKind(format!("Unknown access kind: {}", s))),
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Abstraction of a method declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractionKind {
    Virtual,
    PureVirtual,
    #[default]
    None,
}

impl AbstractionKind {
    fn prefix(&self) -> &'static str {
        match self {
            AbstractionKind::Virtual => "virtual ",
            AbstractionKind::PureVirtual => "pure virtual ",
            AbstractionKind::None => "",
        }
    }
}

/// Where a `const` qualifier sits: in front qualifies the return type,
/// at the back qualifies the method itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstPlacement {
    Front,
    Back,
}

/// Source position appended to keys of entities that cannot be told apart
/// by name alone (locals, anonymous namespaces, unnamed records).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationSuffix {
    pub location: ParseLocation,
    /// Enclosing scope, for same-named entities nested in different scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ParseLocation>,
}

/// Disambiguating context folded into a canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub access: AccessKind,
    pub abstraction: AbstractionKind,
    pub is_static: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constness: Option<ConstPlacement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_suffix: Option<LocationSuffix>,
}

impl Modifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access(mut self, access: AccessKind) -> Self {
        self.access = access;
        self
    }

    pub fn with_abstraction(mut self, abstraction: AbstractionKind) -> Self {
        self.abstraction = abstraction;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_const(mut self, placement: ConstPlacement) -> Self {
        self.constness = Some(placement);
        self
    }

    pub fn with_location_suffix(mut self, location: ParseLocation) -> Self {
        self.location_suffix = Some(LocationSuffix { location, scope: None });
        self
    }

    pub fn with_scoped_location_suffix(mut self, location: ParseLocation, scope: ParseLocation) -> Self {
        self.location_suffix = Some(LocationSuffix { location, scope: Some(scope) });
        self
    }
}

/// One level of a qualified name, e.g. `vector` + `<int>` or `push_back` + `(int)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameComponent {
    pub name: String,
    /// Signature or template argument text, appended verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl NameComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), signature: None }
    }

    pub fn with_signature(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: Some(signature.into()),
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.name);
        if let Some(sig) = &self.signature {
            out.push_str(sig);
        }
    }
}

/// Fully qualified, hierarchical symbol name.
///
/// Two names are equal iff their canonical keys are equal; the `implicit`
/// flag is carried along for the node but never affects identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualifiedName {
    pub components: Vec<NameComponent>,
    #[serde(default)]
    pub implicit: bool,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl QualifiedName {
    pub fn new(components: Vec<NameComponent>) -> Self {
        Self {
            components,
            implicit: false,
            modifiers: Modifiers::default(),
        }
    }

    /// Build a name from a `::`-delimited path; signatures are not split off.
    pub fn from_path(path: &str) -> Self {
        Self::new(
            path.split(NAME_DELIMITER)
                .filter(|part| !part.is_empty())
                .map(NameComponent::new)
                .collect(),
        )
    }

    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Serialize the components only, without any modifiers.
    pub fn serialize_components(&self) -> String {
        let mut out = String::new();
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                out.push_str(NAME_DELIMITER);
            }
            component.write_to(&mut out);
        }
        out
    }

    /// Canonical key using the modifiers the name carries.
    pub fn canonical_key(&self) -> CanonicalKey {
        canonicalize(self, &self.modifiers)
    }
}

impl PartialEq for QualifiedName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for QualifiedName {}

impl std::hash::Hash for QualifiedName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize_components())
    }
}

/// Normalized string identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Key for a file node.
    pub fn for_file(path: &str) -> Self {
        Self(format!("file:{}", path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl From<String> for CanonicalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn add_access_prefix(s: &str, access: AccessKind) -> String {
    format!("{}{}", access.prefix(), s)
}

pub fn add_abstraction_prefix(s: &str, abstraction: AbstractionKind) -> String {
    format!("{}{}", abstraction.prefix(), s)
}

pub fn add_static_prefix(s: &str, is_static: bool) -> String {
    if is_static { format!("static {}", s) } else { s.to_string() }
}

pub fn add_const_prefix(s: &str, is_const: bool, at_front: bool) -> String {
    match (is_const, at_front) {
        (false, _) => s.to_string(),
        (true, true) => format!("const {}", s),
        (true, false) => format!("{} const", s),
    }
}

pub fn add_location_suffix(s: &str, location: &ParseLocation) -> String {
    format!("{} <{}>", s, location.short_form())
}

pub fn add_scoped_location_suffix(s: &str, location: &ParseLocation, scope: &ParseLocation) -> String {
    format!("{} <{}|{}>", s, location.short_form(), scope.short_form())
}

/// Fold a name and its modifiers into a canonical key.
///
/// Pure and total. The composition order is fixed (see module docs) no
/// matter which order the caller set the modifiers in.
pub fn canonicalize(name: &QualifiedName, modifiers: &Modifiers) -> CanonicalKey {
    let mut key = name.serialize_components();

    if modifiers.constness == Some(ConstPlacement::Back) {
        key = add_const_prefix(&key, true, false);
    }
    if let Some(suffix) = &modifiers.location_suffix {
        key = match &suffix.scope {
            Some(scope) => add_scoped_location_suffix(&key, &suffix.location, scope),
            None => add_location_suffix(&key, &suffix.location),
        };
    }
    if modifiers.constness == Some(ConstPlacement::Front) {
        key = add_const_prefix(&key, true, true);
    }
    key = add_static_prefix(&key, modifiers.is_static);
    key = add_abstraction_prefix(&key, modifiers.abstraction);
    key = add_access_prefix(&key, modifiers.access);

    CanonicalKey(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, col: u32) -> ParseLocation {
        ParseLocation::new("src/a.cpp", line, col, line, col + 3)
    }

    #[test]
    fn test_plain_key() {
        let name = QualifiedName::from_path("util::log");
        assert_eq!(name.canonical_key().as_str(), "util::log");
    }

    #[test]
    fn test_signature_is_part_of_key() {
        let name = QualifiedName::new(vec![
            NameComponent::new("Foo"),
            NameComponent::with_signature("bar", "(int)"),
        ]);
        let other = QualifiedName::new(vec![
            NameComponent::new("Foo"),
            NameComponent::with_signature("bar", "(float)"),
        ]);
        assert_eq!(name.canonical_key().as_str(), "Foo::bar(int)");
        assert_ne!(name, other);
    }

    #[test]
    fn test_full_composition_order() {
        let name = QualifiedName::from_path("A::get");
        let mods = Modifiers::new()
            .with_location_suffix(loc(3, 5))
            .with_const(ConstPlacement::Back)
            .with_static(true)
            .with_abstraction(AbstractionKind::Virtual)
            .with_access(AccessKind::Public);
        assert_eq!(
            canonicalize(&name, &mods).as_str(),
            "public virtual static A::get const <src/a.cpp:3:5>"
        );
    }

    #[test]
    fn test_modifier_order_does_not_matter() {
        let name = QualifiedName::from_path("x");
        let a = Modifiers::new()
            .with_access(AccessKind::Private)
            .with_const(ConstPlacement::Front)
            .with_static(true);
        let b = Modifiers::new()
            .with_static(true)
            .with_const(ConstPlacement::Front)
            .with_access(AccessKind::Private);
        assert_eq!(canonicalize(&name, &a), canonicalize(&name, &b));
        assert_eq!(canonicalize(&name, &a).as_str(), "private static const x");
    }

    #[test]
    fn test_scoped_suffix_distinguishes_scopes() {
        let name = QualifiedName::from_path("anonymous namespace");
        let first = Modifiers::new().with_scoped_location_suffix(loc(1, 1), loc(10, 1));
        let second = Modifiers::new().with_scoped_location_suffix(loc(1, 1), loc(20, 1));
        assert_ne!(canonicalize(&name, &first), canonicalize(&name, &second));
    }

    #[test]
    fn test_implicit_flag_not_in_key() {
        let explicit = QualifiedName::from_path("Foo::Foo");
        let implicit = QualifiedName::from_path("Foo::Foo").implicit();
        assert_eq!(explicit, implicit);
    }

    #[test]
    fn test_access_none_adds_nothing() {
        assert_eq!(add_access_prefix("f", AccessKind::None), "f");
        assert_eq!(add_abstraction_prefix("f", AbstractionKind::PureVirtual), "pure virtual f");
        assert_eq!(add_const_prefix("f", false, true), "f");
    }

    #[test]
    fn test_access_kind_parse() {
        assert_eq!("Protected".parse::<AccessKind>().unwrap(), AccessKind::Protected);
        assert!("friend".parse::<AccessKind>().is_err());
    }
}
