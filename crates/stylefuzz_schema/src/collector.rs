//! Cross-pass modifier consolidation.
//!
//! Every fuzz document produces its own batch of modifiers. Many of them
//! describe the same missing element, found again by a different pass. The
//! collector keeps one representative per `(parent, name)` key and folds
//! later proposals into it.
//!
//! Passes run on worker threads, so all mutation goes through one mutex: a
//! single `add_modifier` call is an atomic read-modify-write of the
//! grouping tables.

use crate::modifier::{AddAttributeModifier, AddElementModifier, ModifierSink, SchemaModifier};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use stylefuzz_ids::ElementTypeId;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(
        "Modifier targets schema {found_uri} v{found_version}, collector holds {expected_uri} v{expected_version}"
    )]
    BatchMismatch {
        expected_uri: String,
        expected_version: u32,
        found_uri: String,
        found_version: u32,
    },

    #[error("Modifier collector lock poisoned")]
    Poisoned,
}

/// Grouping key for the parent side of a modifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ParentKey {
    /// Existing (or generated) parent type
    Element(ElementTypeId),
    /// Root elements are keyed by their own name
    Root(String),
}

type GroupKey = (ParentKey, String);

#[derive(Debug, Default)]
struct CollectorState {
    batch: Option<(String, u32)>,
    attributes: Vec<AddAttributeModifier>,
    attribute_keys: HashMap<GroupKey, usize>,
    elements: Vec<AddElementModifier>,
    element_keys: HashMap<GroupKey, usize>,
}

impl CollectorState {
    fn check_batch(&mut self, modifier: &SchemaModifier) -> Result<(), CollectorError> {
        match &self.batch {
            None => {
                self.batch = Some((
                    modifier.schema_uri().to_string(),
                    modifier.schema_version(),
                ));
                Ok(())
            }
            Some((uri, version))
                if uri == modifier.schema_uri() && *version == modifier.schema_version() =>
            {
                Ok(())
            }
            Some((uri, version)) => Err(CollectorError::BatchMismatch {
                expected_uri: uri.clone(),
                expected_version: *version,
                found_uri: modifier.schema_uri().to_string(),
                found_version: modifier.schema_version(),
            }),
        }
    }

    fn add_attribute(&mut self, modifier: AddAttributeModifier) {
        let key = (
            ParentKey::Element(modifier.element_id.clone()),
            modifier.name.clone(),
        );
        match self.attribute_keys.get(&key) {
            Some(&idx) => {
                let kept = &self.attributes[idx];
                if kept.equals_ignoring_ids(&modifier) {
                    debug!("Discarding duplicate attribute modifier '@{}'", modifier.name);
                } else {
                    warn!(
                        "Conflicting attribute modifier '@{}' ({} vs {}); keeping the first",
                        modifier.name, kept.datatype, modifier.datatype
                    );
                }
            }
            None => {
                self.attribute_keys.insert(key, self.attributes.len());
                self.attributes.push(modifier);
            }
        }
    }

    fn add_element(&mut self, modifier: AddElementModifier) {
        let parent = match &modifier.element_id {
            Some(id) => ParentKey::Element(id.clone()),
            None => ParentKey::Root(modifier.name.clone()),
        };
        let key = (parent, modifier.name.clone());
        match self.element_keys.get(&key) {
            Some(&idx) => {
                let kept = &self.elements[idx];
                if kept.equals_ignoring_ids(&modifier) {
                    debug!("Discarding duplicate element modifier '{}'", modifier.name);
                } else {
                    debug!("Merging element modifier '{}' into kept proposal", modifier.name);
                    self.elements[idx] = merge_elements(kept, modifier);
                }
            }
            None => {
                self.element_keys.insert(key, self.elements.len());
                self.elements.push(modifier);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.elements.is_empty()
    }

    fn consolidated(&self) -> Vec<SchemaModifier> {
        self.attributes
            .iter()
            .cloned()
            .map(SchemaModifier::AddAttribute)
            .chain(self.elements.iter().cloned().map(SchemaModifier::AddElement))
            .collect()
    }
}

/// Fold `incoming` into a copy of `kept`.
///
/// Nested attributes and sub-elements of `incoming` are transferred onto the
/// kept parent under the same dedup-or-merge rule used at the top level.
/// Returns a new value; `kept` is left untouched.
fn merge_elements(kept: &AddElementModifier, mut incoming: AddElementModifier) -> AddElementModifier {
    let mut merged = kept.clone();
    let (attributes, sub_elements) = incoming.take_children();

    for attribute in attributes {
        match merged.attribute(&attribute.name) {
            Some(existing) if existing.equals_ignoring_ids(&attribute) => {}
            Some(existing) => {
                warn!(
                    "Conflicting nested attribute '@{}' below '{}' ({} vs {}); keeping the first",
                    attribute.name, merged.name, existing.datatype, attribute.datatype
                );
            }
            None => merged.attach_attribute(attribute),
        }
    }

    for sub_element in sub_elements {
        let position = merged
            .sub_elements
            .iter()
            .position(|e| e.name == sub_element.name);
        match position {
            Some(idx) => {
                let existing = &merged.sub_elements[idx];
                if !existing.equals_ignoring_ids(&sub_element) {
                    let combined = merge_elements(existing, sub_element);
                    merged.sub_elements[idx] = combined;
                }
            }
            None => merged.attach_sub_element(sub_element),
        }
    }

    merged
}

/// Consolidates modifiers from many passes into one deduplicated set.
#[derive(Debug, Default)]
pub struct ModifierCollector {
    state: Mutex<CollectorState>,
}

impl ModifierCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, CollectorState>, CollectorError> {
        self.state.lock().map_err(|_| CollectorError::Poisoned)
    }

    /// Accept one modifier.
    ///
    /// Fails if the modifier targets a different schema URI or version than
    /// the first modifier collected.
    pub fn add_modifier(&self, modifier: SchemaModifier) -> Result<(), CollectorError> {
        let mut state = self.state()?;
        state.check_batch(&modifier)?;
        match modifier {
            SchemaModifier::AddAttribute(m) => state.add_attribute(m),
            SchemaModifier::AddElement(m) => state.add_element(m),
        }
        Ok(())
    }

    /// Accept every modifier of one pass.
    pub fn add_all(
        &self,
        modifiers: impl IntoIterator<Item = SchemaModifier>,
    ) -> Result<(), CollectorError> {
        for modifier in modifiers {
            self.add_modifier(modifier)?;
        }
        Ok(())
    }

    /// The consolidated set: attribute modifiers first, then element
    /// modifiers, each in first-seen order.
    pub fn get_consolidated_modifiers(&self) -> Result<Vec<SchemaModifier>, CollectorError> {
        Ok(self.state()?.consolidated())
    }

    pub fn is_empty(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.is_empty(),
            Err(poisoned) => poisoned.into_inner().is_empty(),
        }
    }

    /// Schema URI and version of the collected batch, once known.
    pub fn batch(&self) -> Option<(String, u32)> {
        match self.state.lock() {
            Ok(state) => state.batch.clone(),
            Err(poisoned) => poisoned.into_inner().batch.clone(),
        }
    }
}

impl ModifierSink for &ModifierCollector {
    fn accept(&mut self, modifier: SchemaModifier) -> Result<(), CollectorError> {
        self.add_modifier(modifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::count_modifiers;
    use crate::schema::Datatype;
    use std::sync::Arc;
    use std::thread;

    const URI: &str = "urn:test:orders";

    fn order(attributes: &[&str]) -> AddElementModifier {
        let mut order = AddElementModifier::new(URI, 3, None, "order");
        for name in attributes {
            order.attach_attribute(AddAttributeModifier::new(
                URI,
                3,
                ElementTypeId::new(),
                *name,
            ));
        }
        order
    }

    fn only_element(modifiers: &[SchemaModifier]) -> &AddElementModifier {
        assert_eq!(modifiers.len(), 1, "expected exactly one modifier: {:?}", modifiers);
        match &modifiers[0] {
            SchemaModifier::AddElement(m) => m,
            other => panic!("expected element modifier, got {other}"),
        }
    }

    #[test]
    fn test_empty_collector() {
        let collector = ModifierCollector::new();
        assert!(collector.is_empty());
        assert!(collector.batch().is_none());
        assert!(collector.get_consolidated_modifiers().unwrap().is_empty());
    }

    #[test]
    fn test_identical_passes_collapse() {
        let collector = ModifierCollector::new();
        collector.add_modifier(order(&["id"]).into()).unwrap();
        collector.add_modifier(order(&["id"]).into()).unwrap();

        let consolidated = collector.get_consolidated_modifiers().unwrap();
        let kept = only_element(&consolidated);
        assert_eq!(kept.name, "order");
        assert_eq!(kept.attributes().len(), 1);
    }

    #[test]
    fn test_first_modifier_kept_verbatim() {
        let collector = ModifierCollector::new();
        let first = order(&["id"]);
        collector.add_modifier(first.clone().into()).unwrap();
        collector.add_modifier(order(&["id"]).into()).unwrap();

        let consolidated = collector.get_consolidated_modifiers().unwrap();
        assert_eq!(only_element(&consolidated), &first);
    }

    #[test]
    fn test_different_children_are_unioned() {
        let collector = ModifierCollector::new();
        let first = order(&["id", "date"]);
        let second = order(&["id", "status"]);
        collector.add_modifier(first.clone().into()).unwrap();
        collector.add_modifier(second.into()).unwrap();

        let consolidated = collector.get_consolidated_modifiers().unwrap();
        let kept = only_element(&consolidated);
        let mut names: Vec<_> = kept.attributes().iter().map(|a| a.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["date", "id", "status"]);

        // Transferred children are re-parented onto the retained modifier.
        for attribute in kept.attributes() {
            assert_eq!(attribute.element_id, first.type_id);
        }
        assert_eq!(kept.type_id, first.type_id);
    }

    #[test]
    fn test_nested_duplicates_collapse() {
        let mut a = order(&[]);
        let mut line_a = AddElementModifier::new(URI, 3, None, "line");
        line_a.attach_attribute(AddAttributeModifier::new(URI, 3, ElementTypeId::new(), "sku"));
        a.attach_sub_element(line_a);

        let mut b = order(&["id"]);
        let mut line_b = AddElementModifier::new(URI, 3, None, "line");
        line_b.attach_attribute(AddAttributeModifier::new(URI, 3, ElementTypeId::new(), "sku"));
        line_b.attach_attribute(AddAttributeModifier::new(URI, 3, ElementTypeId::new(), "qty"));
        b.attach_sub_element(line_b);

        let collector = ModifierCollector::new();
        collector.add_all(vec![a.clone().into(), b.into()]).unwrap();

        let consolidated = collector.get_consolidated_modifiers().unwrap();
        let kept = only_element(&consolidated);
        assert_eq!(kept.sub_elements().len(), 1);
        let line = kept.sub_element("line").unwrap();
        assert_eq!(line.attributes().len(), 2);
        assert_eq!(line.element_id.as_ref(), Some(&a.type_id));
        for attribute in line.attributes() {
            assert_eq!(attribute.element_id, line.type_id);
        }
        assert!(kept.attribute("id").is_some());
        assert_eq!(count_modifiers(&consolidated), 5);
    }

    #[test]
    fn test_attributes_grouped_by_parent_and_name() {
        let parent = ElementTypeId::new();
        let other_parent = ElementTypeId::new();
        let collector = ModifierCollector::new();
        collector
            .add_modifier(AddAttributeModifier::new(URI, 3, parent.clone(), "id").into())
            .unwrap();
        collector
            .add_modifier(AddAttributeModifier::new(URI, 3, parent.clone(), "id").into())
            .unwrap();
        collector
            .add_modifier(
                AddAttributeModifier::new(URI, 3, parent.clone(), "id")
                    .with_datatype(Datatype::Integer)
                    .into(),
            )
            .unwrap();
        collector
            .add_modifier(AddAttributeModifier::new(URI, 3, other_parent, "id").into())
            .unwrap();

        let consolidated = collector.get_consolidated_modifiers().unwrap();
        assert_eq!(consolidated.len(), 2);
        match &consolidated[0] {
            SchemaModifier::AddAttribute(m) => assert_eq!(m.datatype, Datatype::String),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_elements_under_different_parents_stay_apart() {
        let collector = ModifierCollector::new();
        let p1 = ElementTypeId::new();
        let p2 = ElementTypeId::new();
        collector
            .add_modifier(AddElementModifier::new(URI, 3, Some(p1), "note").into())
            .unwrap();
        collector
            .add_modifier(AddElementModifier::new(URI, 3, Some(p2), "note").into())
            .unwrap();
        collector
            .add_modifier(AddElementModifier::new(URI, 3, None, "note").into())
            .unwrap();
        assert_eq!(collector.get_consolidated_modifiers().unwrap().len(), 3);
    }

    #[test]
    fn test_batch_mismatch_rejected() {
        let collector = ModifierCollector::new();
        collector.add_modifier(order(&[]).into()).unwrap();

        let wrong_version = AddElementModifier::new(URI, 4, None, "order");
        let err = collector.add_modifier(wrong_version.into()).unwrap_err();
        assert!(matches!(err, CollectorError::BatchMismatch { found_version: 4, .. }));

        let wrong_uri = AddElementModifier::new("urn:other", 3, None, "order");
        assert!(collector.add_modifier(wrong_uri.into()).is_err());
        assert_eq!(collector.batch(), Some((URI.to_string(), 3)));
    }

    #[test]
    fn test_concurrent_submission_loses_nothing() {
        let collector = Arc::new(ModifierCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for i in 0..25 {
                        let attr = format!("a{}", (worker * 25 + i) % 50);
                        collector.add_modifier(order(&[attr.as_str()]).into()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let consolidated = collector.get_consolidated_modifiers().unwrap();
        let kept = only_element(&consolidated);
        assert_eq!(kept.attributes().len(), 50);
    }

    #[test]
    fn test_collector_as_sink() {
        let collector = ModifierCollector::new();
        let mut sink = &collector;
        sink.accept(order(&["id"]).into()).unwrap();
        assert!(!collector.is_empty());
    }
}
