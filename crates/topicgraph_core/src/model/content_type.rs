//! Content type descriptors and the immutable catalog built from them.
//!
//! # Responsibility
//! - Declare which attributes a content type carries and how each persists.
//! - Resolve attribute inheritance through `base` types once, at build time.
//!
//! # Invariants
//! - A catalog is never mutated after construction; share it by reference.
//! - Content type keys are unique case-insensitively.
//! - Base chains terminate; unknown bases and cycles fail construction.

use crate::model::topic::validate_content_type;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Value shape of a declared attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    #[default]
    Text,
    Number,
    Boolean,
    Html,
    TopicReference,
    /// Backed by relationship rows, not attribute rows.
    Relationship,
    /// Backed by child topics, not attribute rows.
    NestedTopics,
}

impl AttributeKind {
    /// Returns whether values of this kind are stored as attribute rows.
    pub fn is_stored_as_attribute(self) -> bool {
        !matches!(self, Self::Relationship | Self::NestedTopics)
    }
}

/// One declared attribute on a content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub key: String,
    #[serde(default)]
    pub kind: AttributeKind,
    /// Stored in the per-topic blob document instead of indexed rows.
    #[serde(default)]
    pub is_extended: bool,
}

impl AttributeDescriptor {
    pub fn new(key: impl Into<String>, kind: AttributeKind, is_extended: bool) -> Self {
        Self {
            key: key.into(),
            kind,
            is_extended,
        }
    }
}

/// Declarative content type, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeDescriptor {
    pub key: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
}

/// Content type with inherited attributes flattened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    key: String,
    base: Option<String>,
    attributes: Vec<AttributeDescriptor>,
}

impl ContentType {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Declared attributes, base types first.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeDescriptor> {
        self.attributes
            .iter()
            .find(|descriptor| descriptor.key.eq_ignore_ascii_case(key))
    }
}

/// Catalog configuration failures.
#[derive(Debug)]
pub enum CatalogError {
    InvalidJson(serde_json::Error),
    InvalidName(String),
    DuplicateContentType(String),
    DuplicateAttribute {
        content_type: String,
        attribute: String,
    },
    UnknownBase {
        content_type: String,
        base: String,
    },
    InheritanceCycle(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(err) => write!(f, "invalid content type catalog json: {err}"),
            Self::InvalidName(name) => write!(f, "invalid content type name `{name}`"),
            Self::DuplicateContentType(name) => {
                write!(f, "content type `{name}` is declared more than once")
            }
            Self::DuplicateAttribute {
                content_type,
                attribute,
            } => write!(
                f,
                "attribute `{attribute}` is declared twice on content type `{content_type}`"
            ),
            Self::UnknownBase { content_type, base } => write!(
                f,
                "content type `{content_type}` derives from unknown type `{base}`"
            ),
            Self::InheritanceCycle(name) => {
                write!(f, "content type `{name}` inherits from itself")
            }
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidJson(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidJson(value)
    }
}

/// Immutable snapshot of content type descriptors.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeCatalog {
    types: HashMap<String, ContentType>,
}

impl ContentTypeCatalog {
    /// Builds a catalog, flattening each type's base chain.
    pub fn new(descriptors: Vec<ContentTypeDescriptor>) -> Result<Self, CatalogError> {
        let mut declared: HashMap<String, ContentTypeDescriptor> = HashMap::new();
        for descriptor in descriptors {
            if validate_content_type(&descriptor.key).is_err() {
                return Err(CatalogError::InvalidName(descriptor.key));
            }
            let mut seen = HashSet::new();
            for attribute in &descriptor.attributes {
                if !seen.insert(attribute.key.to_ascii_lowercase()) {
                    return Err(CatalogError::DuplicateAttribute {
                        content_type: descriptor.key.clone(),
                        attribute: attribute.key.clone(),
                    });
                }
            }
            let folded = descriptor.key.to_ascii_lowercase();
            if declared.contains_key(&folded) {
                return Err(CatalogError::DuplicateContentType(descriptor.key));
            }
            declared.insert(folded, descriptor);
        }

        let mut types = HashMap::with_capacity(declared.len());
        for (folded, descriptor) in &declared {
            let chain = base_chain(descriptor, &declared)?;
            let mut attributes: Vec<AttributeDescriptor> = Vec::new();
            for ancestor in chain.iter().rev() {
                for attribute in &ancestor.attributes {
                    match attributes
                        .iter_mut()
                        .find(|existing| existing.key.eq_ignore_ascii_case(&attribute.key))
                    {
                        Some(existing) => *existing = attribute.clone(),
                        None => attributes.push(attribute.clone()),
                    }
                }
            }
            types.insert(
                folded.clone(),
                ContentType {
                    key: descriptor.key.clone(),
                    base: descriptor.base.clone(),
                    attributes,
                },
            );
        }
        Ok(Self { types })
    }

    /// Parses a JSON array of descriptors.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let descriptors: Vec<ContentTypeDescriptor> = serde_json::from_str(raw)?;
        Self::new(descriptors)
    }

    pub fn get(&self, key: &str) -> Option<&ContentType> {
        self.types.get(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Returns `descriptor` followed by its ancestors, nearest first.
fn base_chain<'a>(
    descriptor: &'a ContentTypeDescriptor,
    declared: &'a HashMap<String, ContentTypeDescriptor>,
) -> Result<Vec<&'a ContentTypeDescriptor>, CatalogError> {
    let mut chain = vec![descriptor];
    let mut visited = HashSet::from([descriptor.key.to_ascii_lowercase()]);
    let mut cursor = descriptor;
    while let Some(base) = cursor.base.as_deref().filter(|base| !base.trim().is_empty()) {
        let folded = base.to_ascii_lowercase();
        if !visited.insert(folded.clone()) {
            return Err(CatalogError::InheritanceCycle(descriptor.key.clone()));
        }
        cursor = declared
            .get(&folded)
            .ok_or_else(|| CatalogError::UnknownBase {
                content_type: cursor.key.clone(),
                base: base.to_string(),
            })?;
        chain.push(cursor);
    }
    Ok(chain)
}
