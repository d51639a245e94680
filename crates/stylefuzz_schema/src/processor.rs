//! Schema Modification Processor
//!
//! Applies a consolidated modifier set to a schema and produces the next
//! version. The prior schema is never mutated.
//!
//! # Algorithm
//!
//! 1. One builder per existing element type (attributes and content type
//!    copied, sub-element references deferred)
//! 2. A dependency edge `parent -> child` for every existing reference
//! 3. Attribute adds go into their parent builder, skipping name collisions
//! 4. Element adds anchored to an existing parent materialize a new type and
//!    reference, skipping name collisions
//! 5. Root element adds extend the root reference list
//! 6. Existing types are finalized in dependency order (children first);
//!    a pass that finalizes nothing while types remain means a cycle

use crate::modifier::{AddAttributeModifier, AddElementModifier, SchemaModifier};
use crate::schema::{AttributeDefinition, ElementReference, ElementType, XmlSchema};
use std::collections::{BTreeMap, HashMap, HashSet};
use stylefuzz_ids::ElementTypeId;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Dependency cycle among element types: {}", .pending.join(", "))]
    DependencyCycle { pending: Vec<String> },
}

/// Outcome counters of one `apply` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Modifiers applied, nested ones included
    pub applied: usize,
    /// Modifiers dropped because of a name collision or an unknown parent
    pub skipped: usize,
}

struct ElementTypeBuilder<'s> {
    original: &'s ElementType,
    attributes: Vec<AttributeDefinition>,
    added_references: Vec<ElementReference>,
}

impl<'s> ElementTypeBuilder<'s> {
    fn new(original: &'s ElementType) -> Self {
        Self {
            original,
            attributes: original.attributes.clone(),
            added_references: Vec::new(),
        }
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    fn has_sub_element(&self, name: &str) -> bool {
        self.original.has_sub_element(name) || self.added_references.iter().any(|r| r.name == name)
    }

    fn finish(self) -> ElementType {
        let mut sub_elements = self.original.sub_elements.clone();
        sub_elements.extend(self.added_references);
        ElementType {
            id: self.original.id.clone(),
            content_type: self.original.content_type,
            attributes: self.attributes,
            sub_elements,
            comment: self.original.comment.clone(),
        }
    }
}

/// Rewrites a schema into its next version.
pub struct SchemaModificationProcessor<'s> {
    prior: &'s XmlSchema,
    builders: HashMap<&'s ElementTypeId, ElementTypeBuilder<'s>>,
    /// parent type -> child types not yet finalized
    dependencies: HashMap<&'s ElementTypeId, HashSet<&'s ElementTypeId>>,
    new_types: Vec<ElementType>,
    root_references: Vec<ElementReference>,
    report: ApplyReport,
}

impl<'s> SchemaModificationProcessor<'s> {
    /// Apply `modifiers` to `prior`, returning the next schema version.
    pub fn apply(
        prior: &XmlSchema,
        modifiers: &[SchemaModifier],
    ) -> Result<XmlSchema, ProcessorError> {
        Self::apply_with_report(prior, modifiers).map(|(schema, _)| schema)
    }

    pub fn apply_with_report(
        prior: &XmlSchema,
        modifiers: &[SchemaModifier],
    ) -> Result<(XmlSchema, ApplyReport), ProcessorError> {
        let mut processor = SchemaModificationProcessor::new(prior);

        let mut attribute_adds: BTreeMap<&ElementTypeId, Vec<&AddAttributeModifier>> =
            BTreeMap::new();
        let mut element_adds: BTreeMap<&ElementTypeId, Vec<&AddElementModifier>> =
            BTreeMap::new();
        let mut root_adds: Vec<&AddElementModifier> = Vec::new();
        for modifier in modifiers {
            match modifier {
                SchemaModifier::AddAttribute(m) => {
                    attribute_adds.entry(&m.element_id).or_default().push(m)
                }
                SchemaModifier::AddElement(m) => match &m.element_id {
                    Some(parent) => element_adds.entry(parent).or_default().push(m),
                    None => root_adds.push(m),
                },
            }
        }

        processor.apply_attribute_adds(attribute_adds);
        processor.apply_element_adds(element_adds);
        processor.apply_root_adds(root_adds);
        let schema = processor.finish()?;
        Ok(schema)
    }

    fn new(prior: &'s XmlSchema) -> Self {
        let builders = prior
            .element_types
            .iter()
            .map(|t| (&t.id, ElementTypeBuilder::new(t)))
            .collect::<HashMap<_, _>>();

        let mut dependencies: HashMap<&'s ElementTypeId, HashSet<&'s ElementTypeId>> =
            HashMap::new();
        for element_type in &prior.element_types {
            let children = dependencies.entry(&element_type.id).or_default();
            for reference in &element_type.sub_elements {
                if builders.contains_key(&reference.element_type) {
                    children.insert(&reference.element_type);
                } else {
                    warn!(
                        "Reference '{}' points at unknown type {}; ignoring dependency",
                        reference.name,
                        reference.element_type.short()
                    );
                }
            }
        }

        Self {
            prior,
            builders,
            dependencies,
            new_types: Vec::new(),
            root_references: prior.root_references.clone(),
            report: ApplyReport::default(),
        }
    }

    fn apply_attribute_adds(&mut self, adds: BTreeMap<&ElementTypeId, Vec<&AddAttributeModifier>>) {
        for (parent, modifiers) in adds {
            let Some(builder) = self.builders.get_mut(parent) else {
                warn!(
                    "Skipping {} attribute modifier(s) for unknown type {}",
                    modifiers.len(),
                    parent.short()
                );
                self.report.skipped += modifiers.len();
                continue;
            };
            for modifier in modifiers {
                if builder.has_attribute(&modifier.name) {
                    warn!(
                        "Skipping attribute '@{}': already declared on type {}",
                        modifier.name,
                        parent.short()
                    );
                    self.report.skipped += 1;
                    continue;
                }
                builder.attributes.push(attribute_from(modifier));
                self.report.applied += 1;
            }
        }
    }

    fn apply_element_adds(&mut self, adds: BTreeMap<&ElementTypeId, Vec<&AddElementModifier>>) {
        for (parent, modifiers) in adds {
            if !self.builders.contains_key(parent) {
                warn!(
                    "Skipping {} element modifier(s) for unknown type {}",
                    modifiers.len(),
                    parent.short()
                );
                self.report.skipped += modifiers.iter().map(|m| m.count()).sum::<usize>();
                continue;
            }
            for modifier in modifiers {
                let collides = self
                    .builders
                    .get(parent)
                    .map(|b| b.has_sub_element(&modifier.name))
                    .unwrap_or(true);
                if collides {
                    warn!(
                        "Skipping element '{}': already declared on type {}",
                        modifier.name,
                        parent.short()
                    );
                    self.report.skipped += modifier.count();
                    continue;
                }
                let reference = self.materialize(modifier);
                if let Some(builder) = self.builders.get_mut(parent) {
                    builder.added_references.push(reference);
                }
            }
        }
    }

    fn apply_root_adds(&mut self, adds: Vec<&AddElementModifier>) {
        for modifier in adds {
            if self.root_references.iter().any(|r| r.name == modifier.name) {
                warn!("Skipping root element '{}': already declared", modifier.name);
                self.report.skipped += modifier.count();
                continue;
            }
            let reference = self.materialize(modifier);
            self.root_references.push(reference);
        }
    }

    /// Build a brand-new type (and the reference to it) from an element
    /// modifier and everything staged below it. New types have no existing
    /// dependencies, so they are finished immediately, children first.
    fn materialize(&mut self, modifier: &AddElementModifier) -> ElementReference {
        let mut element_type =
            ElementType::with_id(modifier.type_id.clone()).with_content_type(modifier.content_type);

        for attribute in modifier.attributes() {
            if element_type.has_attribute(&attribute.name) {
                warn!(
                    "Skipping duplicate nested attribute '@{}' below '{}'",
                    attribute.name, modifier.name
                );
                self.report.skipped += 1;
                continue;
            }
            element_type.attributes.push(attribute_from(attribute));
            self.report.applied += 1;
        }

        for sub_element in modifier.sub_elements() {
            if element_type.has_sub_element(&sub_element.name) {
                warn!(
                    "Skipping duplicate nested element '{}' below '{}'",
                    sub_element.name, modifier.name
                );
                self.report.skipped += sub_element.count();
                continue;
            }
            let reference = self.materialize(sub_element);
            element_type.sub_elements.push(reference);
        }

        debug!(
            "Materialized element '{}' as type {}",
            modifier.name,
            modifier.type_id.short()
        );
        self.new_types.push(element_type);
        self.report.applied += 1;

        ElementReference {
            id: modifier.reference_id.clone(),
            name: modifier.name.clone(),
            element_type: modifier.type_id.clone(),
            min_occurs: modifier.min_occurs,
            max_occurs: modifier.max_occurs,
            comment: modifier.comment.clone(),
        }
    }

    /// Finalize existing types children-first (Kahn's algorithm) and
    /// assemble the next schema version.
    fn finish(mut self) -> Result<(XmlSchema, ApplyReport), ProcessorError> {
        let mut pending: Vec<&'s ElementTypeId> =
            self.prior.element_types.iter().map(|t| &t.id).collect();
        let mut finalized: HashMap<&'s ElementTypeId, ElementType> = HashMap::new();

        while !pending.is_empty() {
            let ready: Vec<&'s ElementTypeId> = pending
                .iter()
                .copied()
                .filter(|id| {
                    self.dependencies
                        .get(id)
                        .map(|children| children.is_empty())
                        .unwrap_or(true)
                })
                .collect();

            if ready.is_empty() {
                let pending = pending.iter().map(|id| id.to_string()).collect();
                return Err(ProcessorError::DependencyCycle { pending });
            }

            for id in &ready {
                if let Some(builder) = self.builders.remove(id) {
                    finalized.insert(*id, builder.finish());
                }
                for children in self.dependencies.values_mut() {
                    children.remove(id);
                }
            }
            pending.retain(|id| !ready.contains(id));
        }

        let mut element_types: Vec<ElementType> = self
            .prior
            .element_types
            .iter()
            .filter_map(|t| finalized.remove(&t.id))
            .collect();
        element_types.extend(self.new_types);

        let schema = XmlSchema {
            uri: self.prior.uri.clone(),
            stylesheet_uri: self.prior.stylesheet_uri.clone(),
            version: self.prior.version + 1,
            element_types,
            root_references: self.root_references,
            functions: self.prior.functions.clone(),
            parameters: self.prior.parameters.clone(),
        };

        info!(
            "Built schema {} v{}: {} modifier(s) applied, {} skipped",
            schema.uri, schema.version, self.report.applied, self.report.skipped
        );
        Ok((schema, self.report))
    }
}

fn attribute_from(modifier: &AddAttributeModifier) -> AttributeDefinition {
    AttributeDefinition {
        id: modifier.attribute_id.clone(),
        name: modifier.name.clone(),
        datatype: modifier.datatype.clone(),
    }
}
