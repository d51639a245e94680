//! Schema Element Proxy
//!
//! A proxy is a schema position. It is either backed by the schema snapshot
//! (`Document`, `Element`, `Attribute`) or by a modifier staged in the
//! current pass (`ElementModifier`, `AttributeModifier`). Navigation works
//! the same for both, so the interpreter never has to care which one it
//! holds.
//!
//! Pending proxies are ids into the coordinator's staging arena. Ids are
//! never reused by a coordinator, so once a flush has emitted a pending
//! modifier its proxy resolves to [`EvaluationError::StaleProxy`].
//!
//! Navigating from an existing position also sees the modifiers staged
//! directly below it, so a child that does not exist yet is reached as a
//! pending proxy. The reverse never happens: a pending position only ever
//! yields pending children.

use crate::coordinator::ModifierCoordinator;
use crate::error::Result;
use std::collections::BTreeSet;
use std::fmt;
use stylefuzz_ids::{AttributeId, ElementReferenceId, ElementTypeId};
use stylefuzz_schema::ElementReference;
use tracing::warn;

/// Id of a staged element modifier, unique per coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingElementId(pub(crate) usize);

/// Id of a staged attribute modifier, unique per coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingAttributeId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaProxy {
    /// The implicit document root
    Document,
    /// An existing element reference and its type
    Element {
        reference: ElementReferenceId,
        element_type: ElementTypeId,
    },
    /// An existing attribute of an existing type
    Attribute {
        owner: ElementTypeId,
        attribute: AttributeId,
    },
    /// An element staged in the current pass
    ElementModifier(PendingElementId),
    /// An attribute staged in the current pass
    AttributeModifier(PendingAttributeId),
}

/// Result of evaluating an expression: an ordered set of positions.
pub type ProxySet = BTreeSet<SchemaProxy>;

impl SchemaProxy {
    pub fn element(reference: &ElementReference) -> Self {
        SchemaProxy::Element {
            reference: reference.id.clone(),
            element_type: reference.element_type.clone(),
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, SchemaProxy::Document)
    }

    pub fn is_element_like(&self) -> bool {
        matches!(
            self,
            SchemaProxy::Element { .. } | SchemaProxy::ElementModifier(_)
        )
    }

    pub fn is_attribute_like(&self) -> bool {
        matches!(
            self,
            SchemaProxy::Attribute { .. } | SchemaProxy::AttributeModifier(_)
        )
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            SchemaProxy::ElementModifier(_) | SchemaProxy::AttributeModifier(_)
        )
    }

    /// Element or attribute name; `None` for the document root.
    pub fn name<'a>(&self, scope: &'a ModifierCoordinator<'_>) -> Result<Option<&'a str>> {
        let index = scope.index();
        Ok(match self {
            SchemaProxy::Document => None,
            SchemaProxy::Element { reference, .. } => {
                index.reference(reference).map(|r| r.name.as_str())
            }
            SchemaProxy::Attribute { owner, attribute } => index
                .element_type(owner)
                .and_then(|t| t.attributes.iter().find(|a| &a.id == attribute))
                .map(|a| a.name.as_str()),
            SchemaProxy::ElementModifier(id) => {
                Some(scope.staging().element(*id)?.modifier.name.as_str())
            }
            SchemaProxy::AttributeModifier(id) => {
                Some(scope.staging().attribute(*id)?.modifier.name.as_str())
            }
        })
    }

    pub fn sub_element(
        &self,
        scope: &ModifierCoordinator<'_>,
        name: &str,
    ) -> Result<Option<SchemaProxy>> {
        let index = scope.index();
        let staging = scope.staging();
        Ok(match self {
            SchemaProxy::Document => match index.root_references_named(name).first() {
                Some(reference) => Some(SchemaProxy::element(reference)),
                None => staging.memoized_root(name).map(SchemaProxy::ElementModifier),
            },
            SchemaProxy::Element { element_type, .. } => {
                match index.sub_element(element_type, name) {
                    Some(reference) => Some(SchemaProxy::element(reference)),
                    None => staging
                        .memoized_element(element_type, name)
                        .map(SchemaProxy::ElementModifier),
                }
            }
            SchemaProxy::ElementModifier(id) => staging
                .staged_sub_element(*id, name)?
                .map(SchemaProxy::ElementModifier),
            SchemaProxy::Attribute { .. } | SchemaProxy::AttributeModifier(_) => None,
        })
    }

    pub fn has_sub_element(&self, scope: &ModifierCoordinator<'_>, name: &str) -> Result<bool> {
        Ok(self.sub_element(scope, name)?.is_some())
    }

    /// Every child element position, existing ones first.
    pub fn sub_elements(&self, scope: &ModifierCoordinator<'_>) -> Result<Vec<SchemaProxy>> {
        let index = scope.index();
        let staging = scope.staging();
        Ok(match self {
            SchemaProxy::Document => index
                .schema()
                .root_references
                .iter()
                .map(SchemaProxy::element)
                .chain(staging.roots().map(SchemaProxy::ElementModifier))
                .collect(),
            SchemaProxy::Element { element_type, .. } => index
                .element_type(element_type)
                .map(|t| t.sub_elements.as_slice())
                .unwrap_or(&[])
                .iter()
                .map(SchemaProxy::element)
                .chain(
                    staging
                        .elements_below(element_type)
                        .map(SchemaProxy::ElementModifier),
                )
                .collect(),
            SchemaProxy::ElementModifier(id) => staging
                .element(*id)?
                .sub_elements
                .iter()
                .copied()
                .map(SchemaProxy::ElementModifier)
                .collect(),
            SchemaProxy::Attribute { .. } | SchemaProxy::AttributeModifier(_) => Vec::new(),
        })
    }

    pub fn sub_attribute(
        &self,
        scope: &ModifierCoordinator<'_>,
        name: &str,
    ) -> Result<Option<SchemaProxy>> {
        let index = scope.index();
        let staging = scope.staging();
        Ok(match self {
            SchemaProxy::Element { element_type, .. } => {
                match index.attribute(element_type, name) {
                    Some(attribute) => Some(SchemaProxy::Attribute {
                        owner: element_type.clone(),
                        attribute: attribute.id.clone(),
                    }),
                    None => staging
                        .memoized_attribute(element_type, name)
                        .map(SchemaProxy::AttributeModifier),
                }
            }
            SchemaProxy::ElementModifier(id) => staging
                .staged_attribute(*id, name)?
                .map(SchemaProxy::AttributeModifier),
            SchemaProxy::Document
            | SchemaProxy::Attribute { .. }
            | SchemaProxy::AttributeModifier(_) => None,
        })
    }

    pub fn has_sub_attribute(&self, scope: &ModifierCoordinator<'_>, name: &str) -> Result<bool> {
        Ok(self.sub_attribute(scope, name)?.is_some())
    }

    /// Every attribute position, existing ones first.
    pub fn sub_attributes(&self, scope: &ModifierCoordinator<'_>) -> Result<Vec<SchemaProxy>> {
        let index = scope.index();
        let staging = scope.staging();
        Ok(match self {
            SchemaProxy::Element { element_type, .. } => index
                .element_type(element_type)
                .map(|t| t.attributes.as_slice())
                .unwrap_or(&[])
                .iter()
                .map(|a| SchemaProxy::Attribute {
                    owner: element_type.clone(),
                    attribute: a.id.clone(),
                })
                .chain(
                    staging
                        .attributes_on(element_type)
                        .map(SchemaProxy::AttributeModifier),
                )
                .collect(),
            SchemaProxy::ElementModifier(id) => staging
                .element(*id)?
                .attributes
                .iter()
                .copied()
                .map(SchemaProxy::AttributeModifier)
                .collect(),
            SchemaProxy::Document
            | SchemaProxy::Attribute { .. }
            | SchemaProxy::AttributeModifier(_) => Vec::new(),
        })
    }

    /// Positions that may contain this one.
    ///
    /// Existing positions are resolved through the schema's reverse
    /// reference lookup. Pending positions are not supported and yield
    /// nothing.
    pub fn parents(&self, scope: &ModifierCoordinator<'_>) -> Result<Vec<SchemaProxy>> {
        let index = scope.index();
        Ok(match self {
            SchemaProxy::Document => Vec::new(),
            SchemaProxy::Element { reference, .. } => {
                if index.reference(reference).is_none() {
                    Vec::new()
                } else {
                    match index.container_of(reference) {
                        None => vec![SchemaProxy::Document],
                        Some(container) => index
                            .references_using(container)
                            .iter()
                            .map(|r| SchemaProxy::element(r))
                            .collect(),
                    }
                }
            }
            SchemaProxy::Attribute { owner, .. } => index
                .references_using(owner)
                .iter()
                .map(|r| SchemaProxy::element(r))
                .collect(),
            SchemaProxy::ElementModifier(_) | SchemaProxy::AttributeModifier(_) => {
                warn!("Parent lookup of a pending position is unsupported: {}", self);
                Vec::new()
            }
        })
    }

    /// Every element position below this one, breadth first.
    ///
    /// Recursive types are visited once per reference.
    pub fn descendants(&self, scope: &ModifierCoordinator<'_>) -> Result<Vec<SchemaProxy>> {
        let mut seen = ProxySet::new();
        let mut ordered = Vec::new();
        let mut frontier = vec![self.clone()];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for proxy in &frontier {
                for child in proxy.sub_elements(scope)? {
                    if seen.insert(child.clone()) {
                        ordered.push(child.clone());
                        next.push(child);
                    }
                }
            }
            frontier = next;
        }
        Ok(ordered)
    }
}

impl fmt::Display for SchemaProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaProxy::Document => write!(f, "document"),
            SchemaProxy::Element { reference, .. } => write!(f, "element {}", reference.short()),
            SchemaProxy::Attribute { attribute, .. } => {
                write!(f, "attribute {}", attribute.short())
            }
            SchemaProxy::ElementModifier(id) => write!(f, "pending element #{}", id.0),
            SchemaProxy::AttributeModifier(id) => write!(f, "pending attribute #{}", id.0),
        }
    }
}
