//! The path specification factory.
//!
//! The factory is a registry of data-driven [`PathSpecDefinition`] records
//! keyed by type indicator. Registration only populates the registry; all
//! validation happens when a node is constructed, so the registry carries
//! no load-time side effects. A process-wide default instance pre-populated
//! with the built-in definitions is available through
//! [`PathSpecFactory::global`]; tests construct isolated factories.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::definitions;
use crate::error::{StrataError, StrataResult};
use crate::path::{
    AttributeValue, PathSpec, ATTRIBUTE_COMPRESSION_METHOD, ATTRIBUTE_ENTRY_INDEX,
    ATTRIBUTE_IDENTIFIER, ATTRIBUTE_INODE, ATTRIBUTE_LOCATION, ATTRIBUTE_PART_INDEX,
    ATTRIBUTE_RANGE_OFFSET, ATTRIBUTE_RANGE_SIZE,
};

// ============================================================================
// Definitions
// ============================================================================

/// Kind of a path spec attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Integer,
    Bytes,
}

/// One permitted attribute of a path spec type.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDefinition {
    pub name: &'static str,
    pub kind: AttributeKind,
}

impl AttributeDefinition {
    pub const fn new(name: &'static str, kind: AttributeKind) -> Self {
        AttributeDefinition { name, kind }
    }
}

/// Whether a path spec type sits at the root of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentPolicy {
    /// Root-layer type: a parent is rejected.
    Forbidden,
    /// Nested type: a parent is mandatory.
    Required,
}

/// Declarative construction rules for one path spec type.
#[derive(Debug, Clone, Copy)]
pub struct PathSpecDefinition {
    pub type_indicator: &'static str,
    pub parent_policy: ParentPolicy,
    /// Attributes this type accepts.
    pub attributes: &'static [AttributeDefinition],
    /// Attributes that must all be present.
    pub required: &'static [&'static str],
    /// At least one of these attributes must be present (empty = no rule).
    pub requires_one_of: &'static [&'static str],
}

impl PathSpecDefinition {
    fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|def| def.name == name)
    }
}

// ============================================================================
// Built-in Definitions
// ============================================================================

const LOCATION: AttributeDefinition =
    AttributeDefinition::new(ATTRIBUTE_LOCATION, AttributeKind::String);
const IDENTIFIER: AttributeDefinition =
    AttributeDefinition::new(ATTRIBUTE_IDENTIFIER, AttributeKind::String);
const INODE: AttributeDefinition = AttributeDefinition::new(ATTRIBUTE_INODE, AttributeKind::Integer);
const ENTRY_INDEX: AttributeDefinition =
    AttributeDefinition::new(ATTRIBUTE_ENTRY_INDEX, AttributeKind::Integer);
const PART_INDEX: AttributeDefinition =
    AttributeDefinition::new(ATTRIBUTE_PART_INDEX, AttributeKind::Integer);
const RANGE_OFFSET: AttributeDefinition =
    AttributeDefinition::new(ATTRIBUTE_RANGE_OFFSET, AttributeKind::Integer);
const RANGE_SIZE: AttributeDefinition =
    AttributeDefinition::new(ATTRIBUTE_RANGE_SIZE, AttributeKind::Integer);
const COMPRESSION_METHOD: AttributeDefinition =
    AttributeDefinition::new(ATTRIBUTE_COMPRESSION_METHOD, AttributeKind::String);

/// Construction rules for every type indicator in the closed registry.
const BUILTIN_DEFINITIONS: &[PathSpecDefinition] = &[
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_OS,
        parent_policy: ParentPolicy::Forbidden,
        attributes: &[LOCATION],
        required: &["location"],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_FAKE,
        parent_policy: ParentPolicy::Forbidden,
        attributes: &[LOCATION],
        required: &["location"],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_MOUNT,
        parent_policy: ParentPolicy::Forbidden,
        attributes: &[IDENTIFIER],
        required: &["identifier"],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_RAW,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_EWF,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_QCOW,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_VHDI,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_VMDK,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_DATA_RANGE,
        parent_policy: ParentPolicy::Required,
        attributes: &[RANGE_OFFSET, RANGE_SIZE],
        required: &["range_offset", "range_size"],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_COMPRESSED_STREAM,
        parent_policy: ParentPolicy::Required,
        attributes: &[COMPRESSION_METHOD],
        required: &["compression_method"],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_GZIP,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_BZIP2,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_XZ,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_TAR,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION],
        required: &["location"],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_ZIP,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION],
        required: &["location"],
        requires_one_of: &[],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_GPT,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, ENTRY_INDEX],
        required: &[],
        requires_one_of: &["location", "entry_index"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_APM,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, ENTRY_INDEX],
        required: &[],
        requires_one_of: &["location", "entry_index"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_MBR,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, ENTRY_INDEX],
        required: &[],
        requires_one_of: &["location", "entry_index"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_LVM,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, ENTRY_INDEX],
        required: &[],
        requires_one_of: &["location", "entry_index"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_APFS_CONTAINER,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, ENTRY_INDEX],
        required: &[],
        requires_one_of: &["location", "entry_index"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_TSK_PARTITION,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, PART_INDEX],
        required: &[],
        requires_one_of: &["location", "part_index"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_TSK,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, INODE],
        required: &[],
        requires_one_of: &["location", "inode"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_NTFS,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, INODE],
        required: &[],
        requires_one_of: &["location", "inode"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_HFS,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, INODE],
        required: &[],
        requires_one_of: &["location", "inode"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_APFS,
        parent_policy: ParentPolicy::Required,
        attributes: &[LOCATION, INODE],
        required: &[],
        requires_one_of: &["location", "inode"],
    },
    PathSpecDefinition {
        type_indicator: definitions::TYPE_INDICATOR_BDE,
        parent_policy: ParentPolicy::Required,
        attributes: &[],
        required: &[],
        requires_one_of: &[],
    },
];

// ============================================================================
// Factory
// ============================================================================

/// Registry of path spec types keyed by type indicator.
#[derive(Debug, Default)]
pub struct PathSpecFactory {
    definitions: RwLock<BTreeMap<String, PathSpecDefinition>>,
}

impl PathSpecFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        PathSpecFactory::default()
    }

    /// Create a factory pre-populated with the built-in definitions.
    pub fn with_builtin_definitions() -> Self {
        let factory = PathSpecFactory::new();
        for definition in BUILTIN_DEFINITIONS {
            factory
                .register(*definition)
                .expect("built-in definitions are unique");
        }
        factory
    }

    /// The process-wide default factory.
    pub fn global() -> &'static PathSpecFactory {
        static GLOBAL: OnceLock<PathSpecFactory> = OnceLock::new();
        GLOBAL.get_or_init(PathSpecFactory::with_builtin_definitions)
    }

    /// Register a path spec type.
    pub fn register(&self, definition: PathSpecDefinition) -> StrataResult<()> {
        let mut definitions = self.definitions.write().expect("factory lock poisoned");
        if definitions.contains_key(definition.type_indicator) {
            return Err(StrataError::AlreadyRegistered {
                type_indicator: definition.type_indicator.to_string(),
            });
        }
        definitions.insert(definition.type_indicator.to_string(), definition);
        Ok(())
    }

    /// Deregister a path spec type.
    pub fn deregister(&self, type_indicator: &str) -> StrataResult<()> {
        let mut definitions = self.definitions.write().expect("factory lock poisoned");
        if definitions.remove(type_indicator).is_none() {
            return Err(StrataError::NotRegistered {
                type_indicator: type_indicator.to_string(),
            });
        }
        Ok(())
    }

    /// Whether a type indicator is registered.
    pub fn is_registered(&self, type_indicator: &str) -> bool {
        self.definitions
            .read()
            .expect("factory lock poisoned")
            .contains_key(type_indicator)
    }

    /// The registered type indicators, sorted.
    pub fn registered_type_indicators(&self) -> Vec<String> {
        self.definitions
            .read()
            .expect("factory lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Construct a validated path spec node.
    pub fn new_path_spec(
        &self,
        type_indicator: &str,
        attributes: &[(&str, AttributeValue)],
        parent: Option<Arc<PathSpec>>,
    ) -> StrataResult<Arc<PathSpec>> {
        let definition = {
            let definitions = self.definitions.read().expect("factory lock poisoned");
            definitions.get(type_indicator).copied().ok_or_else(|| {
                StrataError::path_spec(format!("unknown type indicator: {}", type_indicator))
            })?
        };

        match definition.parent_policy {
            ParentPolicy::Forbidden if parent.is_some() => {
                return Err(StrataError::path_spec(format!(
                    "{} path specification cannot have a parent",
                    type_indicator
                )));
            }
            ParentPolicy::Required if parent.is_none() => {
                return Err(StrataError::path_spec(format!(
                    "{} path specification requires a parent",
                    type_indicator
                )));
            }
            _ => {}
        }

        let mut map = BTreeMap::new();
        for (name, value) in attributes {
            let attribute = definition.attribute(name).ok_or_else(|| {
                StrataError::path_spec(format!(
                    "{} path specification does not accept attribute {}",
                    type_indicator, name
                ))
            })?;
            if value.kind() != attribute.kind {
                return Err(StrataError::path_spec(format!(
                    "attribute {} of {} has the wrong kind",
                    name, type_indicator
                )));
            }
            if let AttributeValue::String(text) = value {
                if text.is_empty() {
                    return Err(StrataError::path_spec(format!(
                        "attribute {} of {} must not be empty",
                        name, type_indicator
                    )));
                }
                if text.contains('\n') {
                    return Err(StrataError::path_spec(format!(
                        "attribute {} of {} must not contain newlines",
                        name, type_indicator
                    )));
                }
            }
            if map.insert(name.to_string(), value.clone()).is_some() {
                return Err(StrataError::path_spec(format!(
                    "attribute {} of {} given twice",
                    name, type_indicator
                )));
            }
        }

        for name in definition.required {
            if !map.contains_key(*name) {
                return Err(StrataError::path_spec(format!(
                    "{} path specification requires attribute {}",
                    type_indicator, name
                )));
            }
        }
        if !definition.requires_one_of.is_empty()
            && !definition
                .requires_one_of
                .iter()
                .any(|name| map.contains_key(*name))
        {
            return Err(StrataError::path_spec(format!(
                "{} path specification requires one of: {}",
                type_indicator,
                definition.requires_one_of.join(", ")
            )));
        }

        Ok(Arc::new(PathSpec::new(type_indicator, map, parent)))
    }

    /// Reconstruct a path spec chain from its comparable string.
    ///
    /// Round-trip law: for any spec `p` built by this factory,
    /// `parse(p.comparable())` equals `p`.
    pub fn parse(&self, comparable: &str) -> StrataResult<Arc<PathSpec>> {
        let mut parent: Option<Arc<PathSpec>> = None;
        for line in comparable.lines() {
            parent = Some(self.parse_line(line, parent)?);
        }
        parent.ok_or_else(|| StrataError::path_spec("empty comparable"))
    }

    fn parse_line(
        &self,
        line: &str,
        parent: Option<Arc<PathSpec>>,
    ) -> StrataResult<Arc<PathSpec>> {
        let rest = line
            .strip_prefix("type=")
            .ok_or_else(|| StrataError::path_spec(format!("malformed comparable line: {}", line)))?;
        let (type_indicator, attribute_text) = match rest.split_once(": ") {
            Some((type_indicator, attribute_text)) => (type_indicator, Some(attribute_text)),
            None => (rest, None),
        };

        let definition = {
            let definitions = self.definitions.read().expect("factory lock poisoned");
            definitions.get(type_indicator).copied().ok_or_else(|| {
                StrataError::path_spec(format!("unknown type indicator: {}", type_indicator))
            })?
        };

        let mut attributes: Vec<(String, AttributeValue)> = Vec::new();
        if let Some(text) = attribute_text {
            for segment in split_attribute_segments(text, line)? {
                let (key, rendered) = segment.split_once(": ").ok_or_else(|| {
                    StrataError::path_spec(format!("malformed comparable line: {}", line))
                })?;
                let attribute = definition.attribute(key).ok_or_else(|| {
                    StrataError::path_spec(format!(
                        "{} path specification does not accept attribute {}",
                        type_indicator, key
                    ))
                })?;
                let value = match attribute.kind {
                    AttributeKind::String => AttributeValue::String(
                        unescape_attribute_value(rendered).ok_or_else(|| {
                            StrataError::path_spec(format!(
                                "attribute {} of {} has a dangling escape: {}",
                                key, type_indicator, rendered
                            ))
                        })?,
                    ),
                    AttributeKind::Integer => AttributeValue::Integer(
                        rendered.parse::<u64>().map_err(|_| {
                            StrataError::path_spec(format!(
                                "attribute {} of {} is not an integer: {}",
                                key, type_indicator, rendered
                            ))
                        })?,
                    ),
                    AttributeKind::Bytes => AttributeValue::Bytes(
                        hex::decode(rendered).map_err(|_| {
                            StrataError::path_spec(format!(
                                "attribute {} of {} is not hex: {}",
                                key, type_indicator, rendered
                            ))
                        })?,
                    ),
                };
                attributes.push((key.to_string(), value));
            }
        }

        let attribute_refs: Vec<(&str, AttributeValue)> = attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        self.new_path_spec(type_indicator, &attribute_refs, parent)
    }
}

/// Split the attribute portion of a comparable line on unescaped `", "`
/// boundaries. A backslash escapes the character after it and is kept for
/// [`unescape_attribute_value`] to consume.
fn split_attribute_segments(text: &str, line: &str) -> StrataResult<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let Some(next) = chars.next() else {
                return Err(StrataError::path_spec(format!(
                    "malformed comparable line: {}",
                    line
                )));
            };
            current.push(ch);
            current.push(next);
        } else if ch == ',' && chars.peek() == Some(&' ') {
            chars.next();
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    segments.push(current);
    Ok(segments)
}

/// Undo the comparable escaping of a string attribute value; `None` when
/// the value ends in a dangling escape.
fn unescape_attribute_value(rendered: &str) -> Option<String> {
    let mut value = String::with_capacity(rendered.len());
    let mut chars = rendered.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            value.push(chars.next()?);
        } else {
            value.push(ch);
        }
    }
    Some(value)
}

// ============================================================================
// Tests
// ============================================================================
