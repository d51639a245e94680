//! Read-only lookup tables over a schema snapshot.

use crate::schema::{AttributeDefinition, ElementReference, ElementType, XmlSchema};
use std::collections::HashMap;
use stylefuzz_ids::{ElementReferenceId, ElementTypeId};

/// Lookup tables built once per schema snapshot.
///
/// The index borrows the schema; it never mutates it.
#[derive(Debug)]
pub struct SchemaIndex<'s> {
    schema: &'s XmlSchema,
    types: HashMap<&'s ElementTypeId, &'s ElementType>,
    references: HashMap<&'s ElementReferenceId, IndexedReference<'s>>,
    users: HashMap<&'s ElementTypeId, Vec<&'s ElementReference>>,
}

#[derive(Debug, Clone, Copy)]
struct IndexedReference<'s> {
    reference: &'s ElementReference,
    /// Type that declares the reference; `None` for root references
    container: Option<&'s ElementTypeId>,
}

impl<'s> SchemaIndex<'s> {
    pub fn new(schema: &'s XmlSchema) -> Self {
        let types: HashMap<_, _> = schema.element_types.iter().map(|t| (&t.id, t)).collect();

        let mut references = HashMap::new();
        let mut users: HashMap<&'s ElementTypeId, Vec<&'s ElementReference>> = HashMap::new();

        for reference in &schema.root_references {
            references.insert(
                &reference.id,
                IndexedReference {
                    reference,
                    container: None,
                },
            );
            users.entry(&reference.element_type).or_default().push(reference);
        }
        for element_type in &schema.element_types {
            for reference in &element_type.sub_elements {
                references.insert(
                    &reference.id,
                    IndexedReference {
                        reference,
                        container: Some(&element_type.id),
                    },
                );
                users.entry(&reference.element_type).or_default().push(reference);
            }
        }

        Self {
            schema,
            types,
            references,
            users,
        }
    }

    pub fn schema(&self) -> &'s XmlSchema {
        self.schema
    }

    pub fn element_type(&self, id: &ElementTypeId) -> Option<&'s ElementType> {
        self.types.get(id).copied()
    }

    pub fn reference(&self, id: &ElementReferenceId) -> Option<&'s ElementReference> {
        self.references.get(id).map(|r| r.reference)
    }

    /// The type declaring `id` as a sub-element, or `None` for root references.
    pub fn container_of(&self, id: &ElementReferenceId) -> Option<&'s ElementTypeId> {
        self.references.get(id).and_then(|r| r.container)
    }

    pub fn is_root_reference(&self, id: &ElementReferenceId) -> bool {
        self.references
            .get(id)
            .map(|r| r.container.is_none())
            .unwrap_or(false)
    }

    /// Every reference (root or nested) whose type is `id`.
    pub fn references_using(&self, id: &ElementTypeId) -> &[&'s ElementReference] {
        self.users.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Root references named `name`, in declaration order.
    pub fn root_references_named(&self, name: &str) -> Vec<&'s ElementReference> {
        self.schema
            .root_references
            .iter()
            .filter(|r| r.name == name)
            .collect()
    }

    pub fn sub_element(&self, type_id: &ElementTypeId, name: &str) -> Option<&'s ElementReference> {
        self.element_type(type_id).and_then(|t| t.sub_element(name))
    }

    pub fn attribute(&self, type_id: &ElementTypeId, name: &str) -> Option<&'s AttributeDefinition> {
        self.element_type(type_id).and_then(|t| t.attribute(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeDefinition;

    #[test]
    fn test_reverse_lookups() {
        let mut schema = XmlSchema::new("urn:test", "t.xsl");
        let address = schema.add_element_type(ElementType::new());
        let customer = schema.add_element_type(ElementType::new());
        let root = schema.add_root_reference("customer", &customer);
        let billing = schema.add_sub_element(&customer, "billing", &address).unwrap();
        let shipping = schema
            .add_sub_element(&customer, "shipping", &address)
            .unwrap();
        schema
            .add_attribute(&address, AttributeDefinition::new("zip"))
            .unwrap();

        let index = SchemaIndex::new(&schema);

        assert!(index.is_root_reference(&root));
        assert!(!index.is_root_reference(&billing));
        assert_eq!(index.container_of(&shipping), Some(&customer));
        assert_eq!(index.container_of(&root), None);

        let users: Vec<_> = index
            .references_using(&address)
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(users, vec!["billing", "shipping"]);

        assert_eq!(index.sub_element(&customer, "billing").unwrap().id, billing);
        assert!(index.attribute(&address, "zip").is_some());
        assert!(index.attribute(&customer, "zip").is_none());
        assert_eq!(index.root_references_named("customer").len(), 1);
        assert!(index.references_using(&ElementTypeId::new()).is_empty());
    }
}
