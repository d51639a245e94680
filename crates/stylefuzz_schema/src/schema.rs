//! Input Schema Types
//!
//! A schema is an immutable, versioned description of the documents the
//! fuzzer generates. Element *types* carry the content model (attributes and
//! sub-element references); element *references* give a type a name and an
//! occurrence range at one position in the tree. Several references may
//! share one type.

use crate::error::{Result, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use stylefuzz_ids::{AttributeId, ElementReferenceId, ElementTypeId, FunctionId, ParameterId};

/// A versioned input schema, keyed by `(uri, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlSchema {
    /// URI identifying the schema lineage
    pub uri: String,

    /// URI of the stylesheet this schema is evolved against
    pub stylesheet_uri: String,

    /// Monotonic version, bumped by every applied modifier batch
    pub version: u32,

    /// All element types, in insertion order
    #[serde(default)]
    pub element_types: Vec<ElementType>,

    /// Elements allowed at the document root
    #[serde(default)]
    pub root_references: Vec<ElementReference>,

    /// Stylesheet functions known to the schema
    #[serde(default)]
    pub functions: Vec<FunctionDefinition>,

    /// Global stylesheet parameters known to the schema
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

impl XmlSchema {
    /// Create an empty schema at version 1
    pub fn new(uri: impl Into<String>, stylesheet_uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            stylesheet_uri: stylesheet_uri.into(),
            version: 1,
            element_types: Vec::new(),
            root_references: Vec::new(),
            functions: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Register an element type and return its id.
    pub fn add_element_type(&mut self, element_type: ElementType) -> ElementTypeId {
        let id = element_type.id.clone();
        self.element_types.push(element_type);
        id
    }

    /// Add a root reference named `name` pointing at `element_type`.
    pub fn add_root_reference(
        &mut self,
        name: impl Into<String>,
        element_type: &ElementTypeId,
    ) -> ElementReferenceId {
        let reference = ElementReference::new(name, element_type.clone());
        let id = reference.id.clone();
        self.root_references.push(reference);
        id
    }

    /// Add a sub-element reference to an existing type.
    pub fn add_sub_element(
        &mut self,
        parent: &ElementTypeId,
        name: impl Into<String>,
        element_type: &ElementTypeId,
    ) -> Result<ElementReferenceId> {
        let reference = ElementReference::new(name, element_type.clone());
        let id = reference.id.clone();
        self.element_type_mut(parent)?.sub_elements.push(reference);
        Ok(id)
    }

    /// Add an attribute to an existing type.
    pub fn add_attribute(
        &mut self,
        parent: &ElementTypeId,
        attribute: AttributeDefinition,
    ) -> Result<AttributeId> {
        let id = attribute.id.clone();
        self.element_type_mut(parent)?.attributes.push(attribute);
        Ok(id)
    }

    pub fn element_type(&self, id: &ElementTypeId) -> Option<&ElementType> {
        self.element_types.iter().find(|t| &t.id == id)
    }

    fn element_type_mut(&mut self, id: &ElementTypeId) -> Result<&mut ElementType> {
        self.element_types
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| SchemaError::UnknownElementType(id.to_string()))
    }

    /// Total number of element references (root and nested).
    pub fn reference_count(&self) -> usize {
        self.root_references.len()
            + self
                .element_types
                .iter()
                .map(|t| t.sub_elements.len())
                .sum::<usize>()
    }

    /// Total number of attribute declarations.
    pub fn attribute_count(&self) -> usize {
        self.element_types.iter().map(|t| t.attributes.len()).sum()
    }

    /// Check referential integrity: every reference points at a known type,
    /// no identifier is used twice, and no element type contains itself,
    /// directly or through its descendants.
    pub fn validate(&self) -> Result<()> {
        let mut type_ids = HashSet::new();
        for element_type in &self.element_types {
            if !type_ids.insert(&element_type.id) {
                return Err(SchemaError::DuplicateId(element_type.id.to_string()));
            }
        }

        let mut reference_ids = HashSet::new();
        let references = self
            .root_references
            .iter()
            .chain(self.element_types.iter().flat_map(|t| t.sub_elements.iter()));
        for reference in references {
            if !reference_ids.insert(&reference.id) {
                return Err(SchemaError::DuplicateId(reference.id.to_string()));
            }
            if !type_ids.contains(&reference.element_type) {
                return Err(SchemaError::UnknownElementType(
                    reference.element_type.to_string(),
                ));
            }
        }

        let mut attribute_ids = HashSet::new();
        for attribute in self.element_types.iter().flat_map(|t| t.attributes.iter()) {
            if !attribute_ids.insert(&attribute.id) {
                return Err(SchemaError::DuplicateId(attribute.id.to_string()));
            }
        }

        self.check_acyclic()
    }

    /// Peel off types whose children are all resolved; whatever remains
    /// sits on a cycle.
    fn check_acyclic(&self) -> Result<()> {
        let mut unresolved: HashMap<&ElementTypeId, HashSet<&ElementTypeId>> = self
            .element_types
            .iter()
            .map(|t| (&t.id, t.sub_elements.iter().map(|r| &r.element_type).collect()))
            .collect();

        loop {
            let ready: Vec<&ElementTypeId> = unresolved
                .iter()
                .filter(|(_, children)| children.iter().all(|c| !unresolved.contains_key(c)))
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in ready {
                unresolved.remove(id);
            }
        }

        match unresolved.keys().min() {
            None => Ok(()),
            Some(id) => Err(SchemaError::TypeCycle(id.to_string())),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The content model shared by every reference that points at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementType {
    pub id: ElementTypeId,

    #[serde(default)]
    pub content_type: ContentType,

    /// Attributes, in declaration order
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,

    /// Sub-element references, in declaration order
    #[serde(default)]
    pub sub_elements: Vec<ElementReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ElementType {
    /// Create an empty type with mixed content
    pub fn new() -> Self {
        Self::with_id(ElementTypeId::new())
    }

    pub fn with_id(id: ElementTypeId) -> Self {
        Self {
            id,
            content_type: ContentType::default(),
            attributes: Vec::new(),
            sub_elements: Vec::new(),
            comment: None,
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_sub_element(&self, name: &str) -> bool {
        self.sub_elements.iter().any(|r| r.name == name)
    }

    pub fn sub_element(&self, name: &str) -> Option<&ElementReference> {
        self.sub_elements.iter().find(|r| r.name == name)
    }
}

impl Default for ElementType {
    fn default() -> Self {
        Self::new()
    }
}

/// A named use of an element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementReference {
    pub id: ElementReferenceId,

    /// Element name as it appears in generated documents
    pub name: String,

    /// The type describing this element's content
    pub element_type: ElementTypeId,

    #[serde(default = "default_min_occurs")]
    pub min_occurs: u32,

    #[serde(default)]
    pub max_occurs: MaxOccurs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_min_occurs() -> u32 {
    1
}

impl ElementReference {
    pub fn new(name: impl Into<String>, element_type: ElementTypeId) -> Self {
        Self {
            id: ElementReferenceId::new(),
            name: name.into(),
            element_type,
            min_occurs: default_min_occurs(),
            max_occurs: MaxOccurs::default(),
            comment: None,
        }
    }

    pub fn with_occurs(mut self, min_occurs: u32, max_occurs: MaxOccurs) -> Self {
        self.min_occurs = min_occurs;
        self.max_occurs = max_occurs;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// An attribute declared on an element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub id: AttributeId,
    pub name: String,
    #[serde(default)]
    pub datatype: Datatype,
}

impl AttributeDefinition {
    /// Unconstrained string attribute
    pub fn new(name: impl Into<String>) -> Self {
        Self::typed(name, Datatype::default())
    }

    pub fn typed(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            id: AttributeId::new(),
            name: name.into(),
            datatype,
        }
    }
}

/// A stylesheet function the schema knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub id: FunctionId,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            id: FunctionId::new(),
            name: name.into(),
            parameters,
        }
    }
}

/// A global stylesheet parameter the generator supplies a value for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub id: ParameterId,
    pub name: String,
    #[serde(default)]
    pub datatype: Datatype,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ParameterId::new(),
            name: name.into(),
            datatype: Datatype::default(),
        }
    }
}

/// Content-type classification of an element type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Empty,
    Simple,
    ElementOnly,
    #[default]
    Mixed,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Empty => write!(f, "empty"),
            ContentType::Simple => write!(f, "simple"),
            ContentType::ElementOnly => write!(f, "element-only"),
            ContentType::Mixed => write!(f, "mixed"),
        }
    }
}

/// Upper occurrence bound of an element reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxOccurs {
    Bounded(u32),
    #[default]
    Unbounded,
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxOccurs::Bounded(n) => write!(f, "{}", n),
            MaxOccurs::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Value space of an attribute or parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Datatype {
    /// Unconstrained string
    #[default]
    String,
    Boolean,
    Integer,
    Decimal,
    Date,
    DateTime,
    Enumeration {
        values: Vec<String>,
    },
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::String => write!(f, "string"),
            Datatype::Boolean => write!(f, "boolean"),
            Datatype::Integer => write!(f, "integer"),
            Datatype::Decimal => write!(f, "decimal"),
            Datatype::Date => write!(f, "date"),
            Datatype::DateTime => write!(f, "dateTime"),
            Datatype::Enumeration { values } => write!(f, "enum({})", values.join("|")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_schema() -> XmlSchema {
        let mut schema = XmlSchema::new("urn:test:orders", "orders.xsl");
        let item = schema.add_element_type(ElementType::new());
        let order = schema.add_element_type(ElementType::new());
        schema.add_root_reference("order", &order);
        schema.add_sub_element(&order, "item", &item).unwrap();
        schema
            .add_attribute(&order, AttributeDefinition::new("id"))
            .unwrap();
        schema
    }

    #[test]
    fn test_schema_defaults() {
        let schema = XmlSchema::new("urn:a", "a.xsl");
        assert_eq!(schema.version, 1);
        assert!(schema.element_types.is_empty());
        assert_eq!(ContentType::default(), ContentType::Mixed);
        assert_eq!(MaxOccurs::default(), MaxOccurs::Unbounded);
        assert_eq!(Datatype::default(), Datatype::String);
    }

    #[test]
    fn test_counts() {
        let schema = order_schema();
        assert_eq!(schema.reference_count(), 2);
        assert_eq!(schema.attribute_count(), 1);
        schema.validate().unwrap();
    }

    #[test]
    fn test_add_to_unknown_type_fails() {
        let mut schema = XmlSchema::new("urn:a", "a.xsl");
        let err = schema
            .add_attribute(&ElementTypeId::new(), AttributeDefinition::new("x"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownElementType(_)));
    }

    #[test]
    fn test_validate_detects_dangling_reference() {
        let mut schema = XmlSchema::new("urn:a", "a.xsl");
        schema.add_root_reference("ghost", &ElementTypeId::new());
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::UnknownElementType(_))
        ));
    }

    #[test]
    fn test_validate_rejects_type_cycles() {
        let mut schema = XmlSchema::new("urn:a", "a.xsl");
        let node = schema.add_element_type(ElementType::new());
        schema.add_root_reference("node", &node);
        schema.add_sub_element(&node, "node", &node).unwrap();
        assert!(matches!(schema.validate(), Err(SchemaError::TypeCycle(_))));

        let mut schema = XmlSchema::new("urn:a", "a.xsl");
        let a = schema.add_element_type(ElementType::new());
        let b = schema.add_element_type(ElementType::new());
        let leaf = schema.add_element_type(ElementType::new());
        schema.add_sub_element(&a, "b", &b).unwrap();
        schema.add_sub_element(&b, "leaf", &leaf).unwrap();
        schema.validate().unwrap();
        schema.add_sub_element(&b, "a", &a).unwrap();
        assert!(matches!(schema.validate(), Err(SchemaError::TypeCycle(_))));
    }

    #[test]
    fn test_json_roundtrip_preserves_order_and_comments() {
        let mut schema = order_schema();
        let order = schema.root_references[0].element_type.clone();
        for name in ["zeta", "alpha", "mid"] {
            schema
                .add_attribute(&order, AttributeDefinition::new(name))
                .unwrap();
        }
        schema.root_references[0].comment = Some("entry point".to_string());

        let json = schema.to_json().unwrap();
        let parsed = XmlSchema::from_json(&json).unwrap();
        assert_eq!(parsed, schema);

        let names: Vec<_> = parsed
            .element_type(&order)
            .unwrap()
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(MaxOccurs::Bounded(3).to_string(), "3");
        assert_eq!(ContentType::ElementOnly.to_string(), "element-only");
        let datatype = Datatype::Enumeration {
            values: vec!["a".into(), "b".into()],
        };
        assert_eq!(datatype.to_string(), "enum(a|b)");
    }
}
