//! Modifier Creation Coordinator
//!
//! One coordinator per pass. It turns element and attribute accesses into
//! staged modifiers and remembers what it staged, so the same position
//! accessed twice stages one modifier.
//!
//! Staged modifiers live in an arena and are referenced by
//! [`PendingElementId`] / [`PendingAttributeId`]. Children of a pending
//! element are attached to that element, which is their uniqueness scope.
//! Top-level modifiers (root elements, and elements or attributes below an
//! existing type) are found again through memo maps.
//!
//! [`ModifierCoordinator::flush`] freezes every top-level modifier, nested
//! children included, hands it to a [`ModifierSink`] and clears the arena.

use crate::error::{EvaluationError, Result};
use crate::proxy::{PendingAttributeId, PendingElementId, SchemaProxy};
use std::collections::HashMap;
use stylefuzz_ids::ElementTypeId;
use stylefuzz_schema::{
    AddAttributeModifier, AddElementModifier, CollectorError, ModifierSink, SchemaIndex,
    SchemaModifier, XmlSchema,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Element,
    Attribute,
}

/// One registered access: what was read, and the position it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub kind: AccessKind,
    pub context: SchemaProxy,
    pub name: String,
    pub target: SchemaProxy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingParent {
    Root,
    Existing(ElementTypeId),
    Pending(PendingElementId),
}

#[derive(Debug)]
pub(crate) struct PendingElement {
    pub(crate) parent: PendingParent,
    /// Childless builder; children are attached on freeze
    pub(crate) modifier: AddElementModifier,
    pub(crate) attributes: Vec<PendingAttributeId>,
    pub(crate) sub_elements: Vec<PendingElementId>,
}

#[derive(Debug)]
pub(crate) struct PendingAttribute {
    /// `None` when the owner is an existing type
    pub(crate) owner: Option<PendingElementId>,
    pub(crate) modifier: AddAttributeModifier,
}

/// Arena of modifiers staged in one pass.
///
/// Ids are the arena position plus a base that only grows across flushes,
/// so an id handed out before a flush never resolves again.
#[derive(Debug, Default)]
pub(crate) struct Staging {
    element_base: usize,
    attribute_base: usize,
    elements: Vec<PendingElement>,
    attributes: Vec<PendingAttribute>,
    root_memo: HashMap<String, PendingElementId>,
    element_memo: HashMap<(ElementTypeId, String), PendingElementId>,
    attribute_memo: HashMap<(ElementTypeId, String), PendingAttributeId>,
}

impl Staging {
    /// Empty arena continuing the id sequence of `self`.
    fn successor(&self) -> Self {
        Self {
            element_base: self.element_base + self.elements.len(),
            attribute_base: self.attribute_base + self.attributes.len(),
            ..Self::default()
        }
    }

    fn element_slot(&self, id: PendingElementId) -> Option<usize> {
        id.0.checked_sub(self.element_base)
            .filter(|slot| *slot < self.elements.len())
    }

    fn attribute_slot(&self, id: PendingAttributeId) -> Option<usize> {
        id.0.checked_sub(self.attribute_base)
            .filter(|slot| *slot < self.attributes.len())
    }

    pub(crate) fn element(&self, id: PendingElementId) -> Result<&PendingElement> {
        self.element_slot(id)
            .map(|slot| &self.elements[slot])
            .ok_or_else(|| EvaluationError::StaleProxy(SchemaProxy::ElementModifier(id).to_string()))
    }

    pub(crate) fn attribute(&self, id: PendingAttributeId) -> Result<&PendingAttribute> {
        self.attribute_slot(id)
            .map(|slot| &self.attributes[slot])
            .ok_or_else(|| {
                EvaluationError::StaleProxy(SchemaProxy::AttributeModifier(id).to_string())
            })
    }

    fn element_mut(&mut self, id: PendingElementId) -> Result<&mut PendingElement> {
        match self.element_slot(id) {
            Some(slot) => Ok(&mut self.elements[slot]),
            None => Err(EvaluationError::StaleProxy(
                SchemaProxy::ElementModifier(id).to_string(),
            )),
        }
    }

    pub(crate) fn memoized_root(&self, name: &str) -> Option<PendingElementId> {
        self.root_memo.get(name).copied()
    }

    pub(crate) fn memoized_element(
        &self,
        parent: &ElementTypeId,
        name: &str,
    ) -> Option<PendingElementId> {
        self.element_memo
            .get(&(parent.clone(), name.to_string()))
            .copied()
    }

    pub(crate) fn memoized_attribute(
        &self,
        parent: &ElementTypeId,
        name: &str,
    ) -> Option<PendingAttributeId> {
        self.attribute_memo
            .get(&(parent.clone(), name.to_string()))
            .copied()
    }

    pub(crate) fn staged_sub_element(
        &self,
        parent: PendingElementId,
        name: &str,
    ) -> Result<Option<PendingElementId>> {
        Ok(self
            .element(parent)?
            .sub_elements
            .iter()
            .copied()
            .find(|id| matches!(self.element(*id), Ok(e) if e.modifier.name == name)))
    }

    pub(crate) fn staged_attribute(
        &self,
        parent: PendingElementId,
        name: &str,
    ) -> Result<Option<PendingAttributeId>> {
        Ok(self
            .element(parent)?
            .attributes
            .iter()
            .copied()
            .find(|id| matches!(self.attribute(*id), Ok(a) if a.modifier.name == name)))
    }

    /// Staged root elements, in staging order.
    pub(crate) fn roots(&self) -> impl Iterator<Item = PendingElementId> + '_ {
        let base = self.element_base;
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.parent == PendingParent::Root)
            .map(move |(i, _)| PendingElementId(base + i))
    }

    /// Staged elements directly below an existing type, in staging order.
    pub(crate) fn elements_below<'a>(
        &'a self,
        parent: &'a ElementTypeId,
    ) -> impl Iterator<Item = PendingElementId> + 'a {
        let base = self.element_base;
        self.elements
            .iter()
            .enumerate()
            .filter(move |(_, e)| matches!(&e.parent, PendingParent::Existing(p) if p == parent))
            .map(move |(i, _)| PendingElementId(base + i))
    }

    /// Staged attributes on an existing type, in staging order.
    pub(crate) fn attributes_on<'a>(
        &'a self,
        parent: &'a ElementTypeId,
    ) -> impl Iterator<Item = PendingAttributeId> + 'a {
        let base = self.attribute_base;
        self.attributes
            .iter()
            .enumerate()
            .filter(move |(_, a)| a.owner.is_none() && &a.modifier.element_id == parent)
            .map(move |(i, _)| PendingAttributeId(base + i))
    }

    fn push_element(&mut self, element: PendingElement) -> PendingElementId {
        let id = PendingElementId(self.element_base + self.elements.len());
        self.elements.push(element);
        id
    }

    fn push_attribute(&mut self, attribute: PendingAttribute) -> PendingAttributeId {
        let id = PendingAttributeId(self.attribute_base + self.attributes.len());
        self.attributes.push(attribute);
        id
    }

    fn len(&self) -> usize {
        self.elements.len() + self.attributes.len()
    }

    /// Build the immutable modifier for a staged element, children included.
    fn freeze(&self, pending: &PendingElement) -> AddElementModifier {
        let mut modifier = pending.modifier.clone();
        for attribute in pending.attributes.iter().filter_map(|id| self.attribute(*id).ok()) {
            modifier.attach_attribute(attribute.modifier.clone());
        }
        for element in pending.sub_elements.iter().filter_map(|id| self.element(*id).ok()) {
            modifier.attach_sub_element(self.freeze(element));
        }
        modifier
    }
}

/// Per-pass staging of schema modifiers.
pub struct ModifierCoordinator<'s> {
    index: SchemaIndex<'s>,
    staging: Staging,
    accesses: Vec<AccessRecord>,
}

impl<'s> ModifierCoordinator<'s> {
    pub fn new(schema: &'s XmlSchema) -> Self {
        Self {
            index: SchemaIndex::new(schema),
            staging: Staging::default(),
            accesses: Vec::new(),
        }
    }

    pub fn index(&self) -> &SchemaIndex<'s> {
        &self.index
    }

    pub(crate) fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Every access registered since the coordinator was created.
    pub fn accesses(&self) -> &[AccessRecord] {
        &self.accesses
    }

    /// Number of modifiers currently staged, nested ones included.
    pub fn staged_count(&self) -> usize {
        self.staging.len()
    }

    /// Register a read of element `name` below `context`.
    ///
    /// Returns the existing position if the schema already declares it,
    /// otherwise the (possibly memoized) staged one.
    pub fn handle_element_access(
        &mut self,
        context: &SchemaProxy,
        name: &str,
    ) -> Result<SchemaProxy> {
        let target = match context {
            SchemaProxy::Document => {
                let matches = self.index.root_references_named(name);
                match matches.as_slice() {
                    [] => SchemaProxy::ElementModifier(self.stage_root(name)),
                    [only] => SchemaProxy::element(only),
                    [first, ..] => {
                        warn!(
                            "{} root references named '{}', using the first",
                            matches.len(),
                            name
                        );
                        SchemaProxy::element(first)
                    }
                }
            }
            SchemaProxy::Element { element_type, .. } => {
                match self.index.sub_element(element_type, name) {
                    Some(reference) => SchemaProxy::element(reference),
                    None => SchemaProxy::ElementModifier(self.stage_below_existing(element_type, name)),
                }
            }
            SchemaProxy::ElementModifier(parent) => {
                match self.staging.staged_sub_element(*parent, name)? {
                    Some(existing) => SchemaProxy::ElementModifier(existing),
                    None => SchemaProxy::ElementModifier(self.stage_below_pending(*parent, name)?),
                }
            }
            SchemaProxy::Attribute { .. } | SchemaProxy::AttributeModifier(_) => {
                return Err(EvaluationError::InvalidArgument(format!(
                    "cannot access element '{}' below {}: attributes have no sub-elements",
                    name, context
                )));
            }
        };

        self.accesses.push(AccessRecord {
            kind: AccessKind::Element,
            context: context.clone(),
            name: name.to_string(),
            target: target.clone(),
        });
        Ok(target)
    }

    /// Register a read of attribute `name` on `context`.
    pub fn handle_attribute_access(
        &mut self,
        context: &SchemaProxy,
        name: &str,
    ) -> Result<SchemaProxy> {
        let target = match context {
            SchemaProxy::Element { element_type, .. } => {
                match self.index.attribute(element_type, name) {
                    Some(attribute) => SchemaProxy::Attribute {
                        owner: element_type.clone(),
                        attribute: attribute.id.clone(),
                    },
                    None => {
                        SchemaProxy::AttributeModifier(self.stage_attribute_on_existing(element_type, name))
                    }
                }
            }
            SchemaProxy::ElementModifier(parent) => {
                match self.staging.staged_attribute(*parent, name)? {
                    Some(existing) => SchemaProxy::AttributeModifier(existing),
                    None => SchemaProxy::AttributeModifier(
                        self.stage_attribute_on_pending(*parent, name)?,
                    ),
                }
            }
            SchemaProxy::Document => {
                return Err(EvaluationError::InvalidArgument(format!(
                    "cannot access attribute '{}' on the document root",
                    name
                )));
            }
            SchemaProxy::Attribute { .. } | SchemaProxy::AttributeModifier(_) => {
                return Err(EvaluationError::InvalidArgument(format!(
                    "cannot access attribute '{}' on {}",
                    name, context
                )));
            }
        };

        self.accesses.push(AccessRecord {
            kind: AccessKind::Attribute,
            context: context.clone(),
            name: name.to_string(),
            target: target.clone(),
        });
        Ok(target)
    }

    /// Register `context` itself as read, as `current()` does.
    pub fn register_current(&mut self, context: &SchemaProxy) -> Result<()> {
        let kind = if context.is_attribute_like() {
            AccessKind::Attribute
        } else if context.is_element_like() {
            AccessKind::Element
        } else {
            debug!("current() on the document root registers nothing");
            return Ok(());
        };
        let name = context
            .name(self)?
            .map(str::to_string)
            .unwrap_or_default();
        self.accesses.push(AccessRecord {
            kind,
            context: context.clone(),
            name,
            target: context.clone(),
        });
        Ok(())
    }

    /// Hand every staged top-level modifier to `sink` and clear the staging
    /// area. Returns the number of modifiers emitted, nested ones included.
    ///
    /// Order: attributes on existing types, elements below existing types,
    /// root elements; each in staging order.
    pub fn flush(&mut self, sink: &mut dyn ModifierSink) -> std::result::Result<usize, CollectorError> {
        let next = self.staging.successor();
        let staging = std::mem::replace(&mut self.staging, next);

        let attributes = staging
            .attributes
            .iter()
            .filter(|a| a.owner.is_none())
            .map(|a| SchemaModifier::from(a.modifier.clone()));
        let below_existing = staging
            .elements
            .iter()
            .filter(|e| matches!(e.parent, PendingParent::Existing(_)))
            .map(|e| SchemaModifier::from(staging.freeze(e)));
        let roots = staging
            .elements
            .iter()
            .filter(|e| e.parent == PendingParent::Root)
            .map(|e| SchemaModifier::from(staging.freeze(e)));

        let mut emitted = 0;
        for modifier in attributes.chain(below_existing).chain(roots) {
            emitted += modifier.count();
            debug!("Flushing {}", modifier);
            sink.accept(modifier)?;
        }
        Ok(emitted)
    }

    fn schema(&self) -> &'s XmlSchema {
        self.index.schema()
    }

    fn stage_root(&mut self, name: &str) -> PendingElementId {
        if let Some(id) = self.staging.memoized_root(name) {
            return id;
        }
        let schema = self.schema();
        let modifier = AddElementModifier::new(&schema.uri, schema.version, None, name);
        debug!("Staging root element '{}'", name);
        let id = self.staging.push_element(PendingElement {
            parent: PendingParent::Root,
            modifier,
            attributes: Vec::new(),
            sub_elements: Vec::new(),
        });
        self.staging.root_memo.insert(name.to_string(), id);
        id
    }

    fn stage_below_existing(&mut self, parent: &ElementTypeId, name: &str) -> PendingElementId {
        if let Some(id) = self.staging.memoized_element(parent, name) {
            return id;
        }
        let schema = self.schema();
        let modifier =
            AddElementModifier::new(&schema.uri, schema.version, Some(parent.clone()), name)
                .with_comment(self.placement_comment(parent));
        debug!("Staging element '{}' below type {}", name, parent.short());
        let id = self.staging.push_element(PendingElement {
            parent: PendingParent::Existing(parent.clone()),
            modifier,
            attributes: Vec::new(),
            sub_elements: Vec::new(),
        });
        self.staging
            .element_memo
            .insert((parent.clone(), name.to_string()), id);
        id
    }

    fn stage_below_pending(
        &mut self,
        parent: PendingElementId,
        name: &str,
    ) -> Result<PendingElementId> {
        let parent_modifier = &self.staging.element(parent)?.modifier;
        let mut modifier = AddElementModifier::new(
            &parent_modifier.schema_uri,
            parent_modifier.schema_version,
            Some(parent_modifier.type_id.clone()),
            name,
        );
        modifier.dependencies.insert(parent_modifier.id.clone());
        debug!(
            "Staging element '{}' below pending '{}'",
            name, parent_modifier.name
        );
        let id = self.staging.push_element(PendingElement {
            parent: PendingParent::Pending(parent),
            modifier,
            attributes: Vec::new(),
            sub_elements: Vec::new(),
        });
        self.staging.element_mut(parent)?.sub_elements.push(id);
        Ok(id)
    }

    fn stage_attribute_on_existing(&mut self, parent: &ElementTypeId, name: &str) -> PendingAttributeId {
        if let Some(id) = self.staging.memoized_attribute(parent, name) {
            return id;
        }
        let schema = self.schema();
        let modifier = AddAttributeModifier::new(&schema.uri, schema.version, parent.clone(), name);
        debug!("Staging attribute '@{}' on type {}", name, parent.short());
        let id = self.staging.push_attribute(PendingAttribute {
            owner: None,
            modifier,
        });
        self.staging
            .attribute_memo
            .insert((parent.clone(), name.to_string()), id);
        id
    }

    fn stage_attribute_on_pending(
        &mut self,
        parent: PendingElementId,
        name: &str,
    ) -> Result<PendingAttributeId> {
        let parent_modifier = &self.staging.element(parent)?.modifier;
        let mut modifier = AddAttributeModifier::new(
            &parent_modifier.schema_uri,
            parent_modifier.schema_version,
            parent_modifier.type_id.clone(),
            name,
        );
        modifier.dependencies.insert(parent_modifier.id.clone());
        debug!(
            "Staging attribute '@{}' on pending '{}'",
            name, parent_modifier.name
        );
        let id = self.staging.push_attribute(PendingAttribute {
            owner: Some(parent),
            modifier,
        });
        self.staging.element_mut(parent)?.attributes.push(id);
        Ok(id)
    }

    /// Human-readable note naming where a new child of `parent` will appear.
    fn placement_comment(&self, parent: &ElementTypeId) -> String {
        let users = self.index.references_using(parent);
        match users {
            [] => format!("Added below unreferenced element type {}", parent),
            [only] => format!("Added below element '{}'", only.name),
            many => {
                let names: Vec<String> = many.iter().map(|r| format!("'{}'", r.name)).collect();
                format!("Added below elements {}", names.join(", "))
            }
        }
    }
}
