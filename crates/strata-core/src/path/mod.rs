//! Path specifications: immutable linked nodes describing one format layer
//! each.
//!
//! A path specification names an addressable object inside a nested format
//! stack: each node carries a type indicator, type-specific attributes, and
//! an optional parent node, forming a chain from a root layer (`OS`,
//! `FAKE`, or `MOUNT`) out to the leaf. Nodes are immutable after
//! construction and shared by reference (`Arc`); equality, hashing, and
//! cache keying are all defined by the canonical `comparable` string.
//!
//! ## Comparable format
//!
//! Each node contributes one line of the form `type=<TI>: k1: v1, k2: v2`
//! with attribute keys in lexicographic order (a node without attributes
//! renders as `type=<TI>`). The parent's comparable precedes the node's
//! line, joined by a newline. Integer values render in decimal, byte
//! values as lowercase hex. Commas and backslashes in string values are
//! backslash-escaped so attribute boundaries stay unambiguous and
//! [`PathSpecFactory::parse`] round-trips every constructible value.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub mod factory;

pub use factory::{
    AttributeDefinition, AttributeKind, ParentPolicy, PathSpecDefinition, PathSpecFactory,
};

// ============================================================================
// Attribute Names
// ============================================================================

/// Pathlike string within a layer.
pub const ATTRIBUTE_LOCATION: &str = "location";
/// Integer identifier within a filesystem layer.
pub const ATTRIBUTE_INODE: &str = "inode";
/// 0-based entry index within a partition or volume layer.
pub const ATTRIBUTE_ENTRY_INDEX: &str = "entry_index";
/// Opaque string identifier (GUID, mount id).
pub const ATTRIBUTE_IDENTIFIER: &str = "identifier";
/// Byte offset within the parent layer.
pub const ATTRIBUTE_OFFSET: &str = "offset";
/// 0-based partition index for SleuthKit partition layers.
pub const ATTRIBUTE_PART_INDEX: &str = "part_index";
/// Start of a data range within the parent layer.
pub const ATTRIBUTE_RANGE_OFFSET: &str = "range_offset";
/// Size of a data range within the parent layer.
pub const ATTRIBUTE_RANGE_SIZE: &str = "range_size";
/// Compression method of a compressed stream layer.
pub const ATTRIBUTE_COMPRESSION_METHOD: &str = "compression_method";

// ============================================================================
// Attribute Values
// ============================================================================

/// A typed attribute value of a path specification node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Printable string (locations, identifiers).
    String(String),
    /// Unsigned integer (indices, offsets, sizes); rendered in decimal.
    Integer(u64),
    /// Raw bytes (keys, salts); rendered as lowercase hex.
    Bytes(Vec<u8>),
}

impl AttributeValue {
    /// The kind of this value.
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::String(_) => AttributeKind::String,
            AttributeValue::Integer(_) => AttributeKind::Integer,
            AttributeValue::Bytes(_) => AttributeKind::Bytes,
        }
    }

    /// The string content, when this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// The integer content, when this is an integer value.
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            AttributeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// The byte content, when this is a bytes value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    /// Canonical rendering used inside comparables.
    ///
    /// Commas and backslashes in string values are backslash-escaped so
    /// the attribute list of a comparable line stays parseable.
    fn render(&self) -> String {
        match self {
            AttributeValue::String(value) => {
                let mut rendered = String::with_capacity(value.len());
                for ch in value.chars() {
                    if ch == '\\' || ch == ',' {
                        rendered.push('\\');
                    }
                    rendered.push(ch);
                }
                rendered
            }
            AttributeValue::Integer(value) => value.to_string(),
            AttributeValue::Bytes(value) => hex::encode(value),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Integer(u64::from(value))
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        AttributeValue::Integer(value as u64)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        AttributeValue::Bytes(value)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(value: &[u8]) -> Self {
        AttributeValue::Bytes(value.to_vec())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ============================================================================
// Path Specification
// ============================================================================

/// One node in a path specification chain.
///
/// Construction goes through [`PathSpecFactory::new_path_spec`], which
/// validates the attribute set against the registered definition for the
/// node's type indicator. Nodes are immutable; a node with no parent is a
/// root layer.
#[derive(Debug)]
pub struct PathSpec {
    type_indicator: String,
    attributes: BTreeMap<String, AttributeValue>,
    parent: Option<Arc<PathSpec>>,
    comparable: String,
}

impl PathSpec {
    /// Build a node from validated parts. The factory is the only caller.
    pub(crate) fn new(
        type_indicator: &str,
        attributes: BTreeMap<String, AttributeValue>,
        parent: Option<Arc<PathSpec>>,
    ) -> Self {
        let comparable = Self::build_comparable(type_indicator, &attributes, parent.as_deref());
        PathSpec {
            type_indicator: type_indicator.to_string(),
            attributes,
            parent,
            comparable,
        }
    }

    /// Rebuild this node on top of a different parent chain.
    ///
    /// Used by the resolver when substituting mount bindings; attributes
    /// and type indicator carry over unchanged.
    pub(crate) fn with_parent(&self, parent: Option<Arc<PathSpec>>) -> Self {
        PathSpec::new(&self.type_indicator, self.attributes.clone(), parent)
    }

    fn build_comparable(
        type_indicator: &str,
        attributes: &BTreeMap<String, AttributeValue>,
        parent: Option<&PathSpec>,
    ) -> String {
        let mut comparable = String::new();
        if let Some(parent) = parent {
            comparable.push_str(parent.comparable());
            comparable.push('\n');
        }
        let _ = write!(comparable, "type={}", type_indicator);
        for (index, (key, value)) in attributes.iter().enumerate() {
            let separator = if index == 0 { ": " } else { ", " };
            let _ = write!(comparable, "{}{}: {}", separator, key, value.render());
        }
        comparable
    }

    /// Type indicator of this node.
    pub fn type_indicator(&self) -> &str {
        &self.type_indicator
    }

    /// Parent node, when this is not a root layer.
    pub fn parent(&self) -> Option<&Arc<PathSpec>> {
        self.parent.as_ref()
    }

    /// Whether this node has a parent.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Canonical string form of this node and its ancestry.
    ///
    /// This is the equality basis and the resolver cache key.
    pub fn comparable(&self) -> &str {
        &self.comparable
    }

    /// A named attribute, when present.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Attribute names and values in lexicographic key order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// The `location` attribute, when present.
    pub fn location(&self) -> Option<&str> {
        self.attribute(ATTRIBUTE_LOCATION).and_then(AttributeValue::as_str)
    }

    /// The `inode` attribute, when present.
    pub fn inode(&self) -> Option<u64> {
        self.attribute(ATTRIBUTE_INODE).and_then(AttributeValue::as_integer)
    }

    /// The `entry_index` attribute, when present.
    pub fn entry_index(&self) -> Option<u64> {
        self.attribute(ATTRIBUTE_ENTRY_INDEX)
            .and_then(AttributeValue::as_integer)
    }

    /// The `identifier` attribute, when present.
    pub fn identifier(&self) -> Option<&str> {
        self.attribute(ATTRIBUTE_IDENTIFIER)
            .and_then(AttributeValue::as_str)
    }

    /// The `offset` attribute, when present.
    pub fn offset(&self) -> Option<u64> {
        self.attribute(ATTRIBUTE_OFFSET).and_then(AttributeValue::as_integer)
    }

    /// The `range_offset` attribute, when present.
    pub fn range_offset(&self) -> Option<u64> {
        self.attribute(ATTRIBUTE_RANGE_OFFSET)
            .and_then(AttributeValue::as_integer)
    }

    /// The `range_size` attribute, when present.
    pub fn range_size(&self) -> Option<u64> {
        self.attribute(ATTRIBUTE_RANGE_SIZE)
            .and_then(AttributeValue::as_integer)
    }
}

impl PartialEq for PathSpec {
    fn eq(&self, other: &Self) -> bool {
        self.comparable == other.comparable
    }
}

impl Eq for PathSpec {}

impl Hash for PathSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparable.hash(state);
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.comparable)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(
        type_indicator: &str,
        attributes: &[(&str, AttributeValue)],
        parent: Option<Arc<PathSpec>>,
    ) -> Arc<PathSpec> {
        let map = attributes
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        Arc::new(PathSpec::new(type_indicator, map, parent))
    }

    mod comparable {
        use super::*;

        #[test]
        fn node_without_attributes_renders_bare() {
            let os = spec("OS", &[("location", "/tmp/image.raw".into())], None);
            let raw = spec("RAW", &[], Some(os));
            assert_eq!(
                raw.comparable(),
                "type=OS: location: /tmp/image.raw\ntype=RAW"
            );
        }

        #[test]
        fn attributes_sort_lexicographically() {
            let node = spec(
                "DATA_RANGE",
                &[
                    ("range_size", 512u64.into()),
                    ("range_offset", 1024u64.into()),
                ],
                None,
            );
            assert_eq!(
                node.comparable(),
                "type=DATA_RANGE: range_offset: 1024, range_size: 512"
            );
        }

        #[test]
        fn insertion_order_does_not_matter() {
            let first = spec(
                "GPT",
                &[("entry_index", 0u64.into()), ("location", "/p1".into())],
                None,
            );
            let second = spec(
                "GPT",
                &[("location", "/p1".into()), ("entry_index", 0u64.into())],
                None,
            );
            assert_eq!(first.comparable(), second.comparable());
            assert_eq!(first, second);
        }

        #[test]
        fn bytes_render_as_lowercase_hex() {
            let node = spec("BDE", &[("identifier", vec![0xAB, 0x01].into())], None);
            assert_eq!(node.comparable(), "type=BDE: identifier: ab01");
        }

        #[test]
        fn commas_and_backslashes_escape_in_string_values() {
            let node = spec("OS", &[("location", "/images, old\\disk.raw".into())], None);
            assert_eq!(
                node.comparable(),
                "type=OS: location: /images\\, old\\\\disk.raw"
            );
        }

        #[test]
        fn distinct_attributes_produce_distinct_comparables() {
            let first = spec("GPT", &[("entry_index", 0u64.into())], None);
            let second = spec("GPT", &[("entry_index", 1u64.into())], None);
            assert_ne!(first.comparable(), second.comparable());
            assert_ne!(first, second);
        }
    }

    mod accessors {
        use super::*;

        #[test]
        fn convenience_getters_read_typed_attributes() {
            let os = spec("OS", &[("location", "/tmp/image.raw".into())], None);
            let node = spec(
                "GPT",
                &[("entry_index", 2u64.into())],
                Some(Arc::clone(&os)),
            );
            assert_eq!(node.type_indicator(), "GPT");
            assert_eq!(node.entry_index(), Some(2));
            assert_eq!(node.location(), None);
            assert!(node.has_parent());
            assert_eq!(node.parent().unwrap().location(), Some("/tmp/image.raw"));
        }

        #[test]
        fn with_parent_rebuilds_the_comparable() {
            let first_root = spec("OS", &[("location", "/a".into())], None);
            let second_root = spec("OS", &[("location", "/b".into())], None);
            let node = spec("RAW", &[], Some(first_root));
            let moved = node.with_parent(Some(second_root));
            assert_eq!(moved.comparable(), "type=OS: location: /b\ntype=RAW");
        }
    }
}
