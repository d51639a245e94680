//! Schema Modifiers
//!
//! A modifier is a proposal to add one element or attribute to a schema.
//! Modifiers are staged while a pass evaluates stylesheet expressions,
//! consolidated by the [`ModifierCollector`](crate::ModifierCollector), and
//! finally applied by the
//! [`SchemaModificationProcessor`](crate::SchemaModificationProcessor).
//!
//! Element modifiers own their nested modifiers: an attribute or element that
//! only makes sense below a not-yet-existing element lives inside that
//! element's modifier rather than as a separate top-level proposal.
//!
//! # Identity
//!
//! Every modifier carries generated identifiers (its own [`ModifierId`], the
//! reference/type/attribute ids it will create) plus a dependency set. Two
//! passes that discover the same missing element produce modifiers that
//! differ only in those ids, so consolidation compares modifiers with
//! [`AddElementModifier::equals_ignoring_ids`].

use crate::collector::CollectorError;
use crate::schema::{ContentType, Datatype, MaxOccurs};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use stylefuzz_ids::{AttributeId, ElementReferenceId, ElementTypeId, ModifierId};

/// Proposal to add an attribute to an element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddAttributeModifier {
    pub id: ModifierId,

    pub schema_uri: String,
    pub schema_version: u32,

    /// Type receiving the attribute (existing, or generated by a parent modifier)
    pub element_id: ElementTypeId,

    /// Id the new attribute will carry
    pub attribute_id: AttributeId,

    pub name: String,

    #[serde(default)]
    pub datatype: Datatype,

    #[serde(default)]
    pub dependencies: BTreeSet<ModifierId>,
}

impl AddAttributeModifier {
    pub fn new(
        schema_uri: impl Into<String>,
        schema_version: u32,
        element_id: ElementTypeId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: ModifierId::new(),
            schema_uri: schema_uri.into(),
            schema_version,
            element_id,
            attribute_id: AttributeId::new(),
            name: name.into(),
            datatype: Datatype::default(),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_datatype(mut self, datatype: Datatype) -> Self {
        self.datatype = datatype;
        self
    }

    /// Structural equality over everything except generated ids and dependencies.
    pub fn equals_ignoring_ids(&self, other: &Self) -> bool {
        self.structurally_equal(other, true)
    }

    pub fn hash_code_ignoring_ids(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_structure(&mut hasher, true);
        hasher.finish()
    }

    fn structurally_equal(&self, other: &Self, compare_parent: bool) -> bool {
        self.schema_uri == other.schema_uri
            && self.schema_version == other.schema_version
            && (!compare_parent || self.element_id == other.element_id)
            && self.name == other.name
            && self.datatype == other.datatype
    }

    fn hash_structure<H: Hasher>(&self, state: &mut H, include_parent: bool) {
        self.schema_uri.hash(state);
        self.schema_version.hash(state);
        if include_parent {
            self.element_id.hash(state);
        }
        self.name.hash(state);
        self.datatype.hash(state);
    }

    pub fn count(&self) -> usize {
        1
    }
}

/// Proposal to add an element (a new type plus a reference to it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddElementModifier {
    pub id: ModifierId,

    pub schema_uri: String,
    pub schema_version: u32,

    /// Parent type; `None` means a new root reference
    pub element_id: Option<ElementTypeId>,

    /// Id the new reference will carry
    pub reference_id: ElementReferenceId,

    /// Id the new element type will carry
    pub type_id: ElementTypeId,

    pub name: String,

    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
    pub content_type: ContentType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeSet<ModifierId>,

    #[serde(default)]
    pub(crate) attributes: Vec<AddAttributeModifier>,

    #[serde(default)]
    pub(crate) sub_elements: Vec<AddElementModifier>,
}

impl AddElementModifier {
    /// New element modifier with `min_occurs = 1`, unbounded max, mixed content.
    pub fn new(
        schema_uri: impl Into<String>,
        schema_version: u32,
        element_id: Option<ElementTypeId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: ModifierId::new(),
            schema_uri: schema_uri.into(),
            schema_version,
            element_id,
            reference_id: ElementReferenceId::new(),
            type_id: ElementTypeId::new(),
            name: name.into(),
            min_occurs: 1,
            max_occurs: MaxOccurs::default(),
            content_type: ContentType::default(),
            comment: None,
            dependencies: BTreeSet::new(),
            attributes: Vec::new(),
            sub_elements: Vec::new(),
        }
    }

    pub fn with_occurs(mut self, min_occurs: u32, max_occurs: MaxOccurs) -> Self {
        self.min_occurs = min_occurs;
        self.max_occurs = max_occurs;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.element_id.is_none()
    }

    pub fn attributes(&self) -> &[AddAttributeModifier] {
        &self.attributes
    }

    pub fn sub_elements(&self) -> &[AddElementModifier] {
        &self.sub_elements
    }

    pub fn attribute(&self, name: &str) -> Option<&AddAttributeModifier> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn sub_element(&self, name: &str) -> Option<&AddElementModifier> {
        self.sub_elements.iter().find(|e| e.name == name)
    }

    /// Stage an attribute below this element, re-parenting it onto the
    /// generated type and recording the dependency on this modifier.
    pub fn attach_attribute(&mut self, mut attribute: AddAttributeModifier) {
        attribute.element_id = self.type_id.clone();
        attribute.dependencies.clear();
        attribute.dependencies.insert(self.id.clone());
        self.attributes.push(attribute);
    }

    /// Stage a sub-element below this element, re-parenting it onto the
    /// generated type and recording the dependency on this modifier.
    pub fn attach_sub_element(&mut self, mut element: AddElementModifier) {
        element.element_id = Some(self.type_id.clone());
        element.dependencies.clear();
        element.dependencies.insert(self.id.clone());
        self.sub_elements.push(element);
    }

    /// Take the nested modifiers out, leaving this modifier childless.
    pub fn take_children(&mut self) -> (Vec<AddAttributeModifier>, Vec<AddElementModifier>) {
        (
            std::mem::take(&mut self.attributes),
            std::mem::take(&mut self.sub_elements),
        )
    }

    /// Structural equality over everything except generated ids and
    /// dependencies. Nested modifiers are compared as unordered collections;
    /// their parent ids are implied by containment and not compared.
    pub fn equals_ignoring_ids(&self, other: &Self) -> bool {
        self.structurally_equal(other, true)
    }

    pub fn hash_code_ignoring_ids(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_structure(&mut hasher, true);
        hasher.finish()
    }

    fn structurally_equal(&self, other: &Self, compare_parent: bool) -> bool {
        self.schema_uri == other.schema_uri
            && self.schema_version == other.schema_version
            && (!compare_parent || self.element_id == other.element_id)
            && self.name == other.name
            && self.min_occurs == other.min_occurs
            && self.max_occurs == other.max_occurs
            && self.content_type == other.content_type
            && self.comment == other.comment
            && same_members(&self.attributes, &other.attributes, |a, b| {
                a.structurally_equal(b, false)
            })
            && same_members(&self.sub_elements, &other.sub_elements, |a, b| {
                a.structurally_equal(b, false)
            })
    }

    fn hash_structure<H: Hasher>(&self, state: &mut H, include_parent: bool) {
        self.schema_uri.hash(state);
        self.schema_version.hash(state);
        if include_parent {
            self.element_id.hash(state);
        }
        self.name.hash(state);
        self.min_occurs.hash(state);
        self.max_occurs.hash(state);
        self.content_type.hash(state);
        self.comment.hash(state);

        // Order-insensitive over children.
        let mut child_hashes: Vec<u64> = self
            .attributes
            .iter()
            .map(|a| {
                let mut h = DefaultHasher::new();
                a.hash_structure(&mut h, false);
                h.finish()
            })
            .chain(self.sub_elements.iter().map(|e| {
                let mut h = DefaultHasher::new();
                e.hash_structure(&mut h, false);
                h.finish()
            }))
            .collect();
        child_hashes.sort_unstable();
        child_hashes.hash(state);
    }

    /// This modifier plus every nested one.
    pub fn count(&self) -> usize {
        1 + self.attributes.len() + self.sub_elements.iter().map(|e| e.count()).sum::<usize>()
    }
}

fn same_members<T>(left: &[T], right: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    left.len() == right.len()
        && left.iter().all(|l| right.iter().any(|r| eq(l, r)))
        && right.iter().all(|r| left.iter().any(|l| eq(l, r)))
}

/// A staged schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaModifier {
    AddElement(AddElementModifier),
    AddAttribute(AddAttributeModifier),
}

impl SchemaModifier {
    pub fn id(&self) -> &ModifierId {
        match self {
            SchemaModifier::AddElement(m) => &m.id,
            SchemaModifier::AddAttribute(m) => &m.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SchemaModifier::AddElement(m) => &m.name,
            SchemaModifier::AddAttribute(m) => &m.name,
        }
    }

    pub fn schema_uri(&self) -> &str {
        match self {
            SchemaModifier::AddElement(m) => &m.schema_uri,
            SchemaModifier::AddAttribute(m) => &m.schema_uri,
        }
    }

    pub fn schema_version(&self) -> u32 {
        match self {
            SchemaModifier::AddElement(m) => m.schema_version,
            SchemaModifier::AddAttribute(m) => m.schema_version,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            SchemaModifier::AddElement(m) => m.count(),
            SchemaModifier::AddAttribute(m) => m.count(),
        }
    }

    pub fn equals_ignoring_ids(&self, other: &Self) -> bool {
        match (self, other) {
            (SchemaModifier::AddElement(a), SchemaModifier::AddElement(b)) => {
                a.equals_ignoring_ids(b)
            }
            (SchemaModifier::AddAttribute(a), SchemaModifier::AddAttribute(b)) => {
                a.equals_ignoring_ids(b)
            }
            _ => false,
        }
    }

    pub fn hash_code_ignoring_ids(&self) -> u64 {
        match self {
            SchemaModifier::AddElement(m) => m.hash_code_ignoring_ids(),
            SchemaModifier::AddAttribute(m) => m.hash_code_ignoring_ids(),
        }
    }
}

impl From<AddElementModifier> for SchemaModifier {
    fn from(m: AddElementModifier) -> Self {
        SchemaModifier::AddElement(m)
    }
}

impl From<AddAttributeModifier> for SchemaModifier {
    fn from(m: AddAttributeModifier) -> Self {
        SchemaModifier::AddAttribute(m)
    }
}

impl fmt::Display for AddAttributeModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Add attribute '@{}' ({}) to type {}",
            self.name,
            self.datatype,
            self.element_id.short()
        )
    }
}

impl fmt::Display for AddElementModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element_id {
            Some(parent) => write!(f, "Add element '{}' to type {}", self.name, parent.short())?,
            None => write!(f, "Add root element '{}'", self.name)?,
        }
        write!(
            f,
            " [{}..{}, {}]",
            self.min_occurs, self.max_occurs, self.content_type
        )?;
        let nested = self.count() - 1;
        if nested > 0 {
            write!(f, " with {} nested", nested)?;
        }
        Ok(())
    }
}

impl fmt::Display for SchemaModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaModifier::AddElement(m) => m.fmt(f),
            SchemaModifier::AddAttribute(m) => m.fmt(f),
        }
    }
}

/// Total number of modifiers, nested ones included.
pub fn count_modifiers(modifiers: &[SchemaModifier]) -> usize {
    modifiers.iter().map(SchemaModifier::count).sum()
}

/// Destination for finished modifiers.
pub trait ModifierSink {
    fn accept(&mut self, modifier: SchemaModifier) -> Result<(), CollectorError>;
}

impl ModifierSink for Vec<SchemaModifier> {
    fn accept(&mut self, modifier: SchemaModifier) -> Result<(), CollectorError> {
        self.push(modifier);
        Ok(())
    }
}
