//! End-to-End tests for consolidation and schema rewrite
//!
//! Tests the lifecycle: per-pass modifiers -> collector -> processor -> next version.
//! Uses REAL schemas built in memory - no mocks.

use stylefuzz_schema::{
    count_modifiers, AddAttributeModifier, AddElementModifier, AttributeDefinition,
    CollectorError, ElementType, MaxOccurs, ModifierCollector, SchemaModificationProcessor,
    SchemaModifier, XmlSchema,
};

const URI: &str = "urn:test:library";

/// `library` (root) > `book` (@isbn) > `chapter`
fn library() -> XmlSchema {
    let mut schema = XmlSchema::new(URI, "library.xsl").with_version(4);
    let library = schema.add_element_type(ElementType::new());
    let book = schema.add_element_type(ElementType::new());
    let chapter = schema.add_element_type(ElementType::new());
    schema.add_root_reference("library", &library);
    schema.add_sub_element(&library, "book", &book).unwrap();
    schema.add_sub_element(&book, "chapter", &chapter).unwrap();
    schema
        .add_attribute(&book, AttributeDefinition::new("isbn"))
        .unwrap();
    schema
}

fn element_below(schema: &XmlSchema, parent: usize, name: &str) -> AddElementModifier {
    AddElementModifier::new(
        URI,
        schema.version,
        Some(schema.element_types[parent].id.clone()),
        name,
    )
}

// =============================================================================
// CONSOLIDATION
// =============================================================================

/// Equal modifiers from two passes collapse to one whose children are the union.
#[test]
fn test_equal_modifiers_collapse_with_union_of_children() {
    let schema = library();
    let collector = ModifierCollector::new();

    let mut first = element_below(&schema, 1, "review");
    let parent = first.type_id.clone();
    first.attach_attribute(AddAttributeModifier::new(URI, 4, parent, "rating"));

    let mut second = element_below(&schema, 1, "review");
    let parent = second.type_id.clone();
    second.attach_attribute(AddAttributeModifier::new(URI, 4, parent.clone(), "rating"));
    second.attach_attribute(AddAttributeModifier::new(URI, 4, parent, "author"));

    collector.add_modifier(first.clone().into()).unwrap();
    collector.add_modifier(first.into()).unwrap();
    collector.add_modifier(second.into()).unwrap();

    let consolidated = collector.get_consolidated_modifiers().unwrap();
    assert_eq!(consolidated.len(), 1);
    match &consolidated[0] {
        SchemaModifier::AddElement(review) => {
            let mut names: Vec<&str> = review.attributes().iter().map(|a| a.name.as_str()).collect();
            names.sort_unstable();
            assert_eq!(names, vec!["author", "rating"]);
            for attribute in review.attributes() {
                assert_eq!(attribute.element_id, review.type_id);
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

/// Modifiers for another schema version are rejected.
#[test]
fn test_batch_must_match() {
    let schema = library();
    let collector = ModifierCollector::new();
    collector
        .add_modifier(element_below(&schema, 0, "shelf").into())
        .unwrap();

    let stale = AddElementModifier::new(URI, 3, None, "archive");
    let err = collector.add_modifier(stale.into()).unwrap_err();
    assert!(matches!(err, CollectorError::BatchMismatch { .. }));
    assert!(!collector.is_empty());
}

// =============================================================================
// APPLY
// =============================================================================

/// Applying nothing only bumps the version.
#[test]
fn test_empty_apply_is_identity_up_to_version() {
    let schema = library();
    let next = SchemaModificationProcessor::apply(&schema, &[]).unwrap();

    let mut expected = schema.clone();
    expected.version += 1;
    assert_eq!(next, expected);
}

/// Collision-free additions yield a strict superset.
#[test]
fn test_collision_free_apply_is_superset() {
    let schema = library();
    let mut review = element_below(&schema, 1, "review").with_occurs(0, MaxOccurs::Bounded(5));
    let parent = review.type_id.clone();
    review.attach_attribute(AddAttributeModifier::new(URI, 4, parent, "rating"));
    let title = AddAttributeModifier::new(URI, 4, schema.element_types[2].id.clone(), "title");
    let modifiers = vec![SchemaModifier::from(review), SchemaModifier::from(title)];

    let (next, report) = SchemaModificationProcessor::apply_with_report(&schema, &modifiers).unwrap();
    assert_eq!(report.applied, count_modifiers(&modifiers));
    assert_eq!(report.skipped, 0);
    assert_eq!(next.version, 5);
    assert_eq!(next.uri, schema.uri);

    for original in &schema.element_types {
        let evolved = next.element_type(&original.id).unwrap();
        for attribute in &original.attributes {
            assert!(evolved.attributes.contains(attribute));
        }
        for reference in &original.sub_elements {
            assert!(evolved.sub_elements.contains(reference));
        }
    }
    assert_eq!(next.element_types.len(), schema.element_types.len() + 1);
    assert_eq!(next.attribute_count(), schema.attribute_count() + 2);
    assert_eq!(next.reference_count(), schema.reference_count() + 1);

    let book = next.element_type(&schema.element_types[1].id).unwrap();
    let review = book.sub_element("review").unwrap();
    assert_eq!(review.min_occurs, 0);
    assert_eq!(review.max_occurs, MaxOccurs::Bounded(5));
    next.validate().unwrap();
}

/// Colliding additions are dropped entirely.
#[test]
fn test_colliding_apply_equals_empty_apply() {
    let schema = library();
    let modifiers = vec![
        SchemaModifier::from(element_below(&schema, 1, "chapter")),
        SchemaModifier::from(AddAttributeModifier::new(
            URI,
            4,
            schema.element_types[1].id.clone(),
            "isbn",
        )),
        SchemaModifier::from(AddElementModifier::new(URI, 4, None, "library")),
    ];

    let (next, report) = SchemaModificationProcessor::apply_with_report(&schema, &modifiers).unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped, 3);
    assert_eq!(next, SchemaModificationProcessor::apply(&schema, &[]).unwrap());
}

/// Consolidated output from a collector applies cleanly and round-trips.
#[test]
fn test_collector_to_processor_round_trip() {
    let schema = library();
    let collector = ModifierCollector::new();
    for _ in 0..3 {
        let mut shelf = element_below(&schema, 0, "shelf");
        let mut label = AddElementModifier::new(URI, 4, None, "label");
        let parent = label.type_id.clone();
        label.attach_attribute(AddAttributeModifier::new(URI, 4, parent, "lang"));
        shelf.attach_sub_element(label);
        collector.add_modifier(shelf.into()).unwrap();
    }

    let consolidated = collector.get_consolidated_modifiers().unwrap();
    assert_eq!(count_modifiers(&consolidated), 3);

    let next = SchemaModificationProcessor::apply(&schema, &consolidated).unwrap();
    let json = next.to_json().unwrap();
    let reloaded = XmlSchema::from_json(&json).unwrap();
    assert_eq!(reloaded, next);

    let library_type = next.element_type(&schema.element_types[0].id).unwrap();
    let shelf = library_type.sub_element("shelf").unwrap();
    assert_eq!(shelf.comment, None);
    let shelf_type = next.element_type(&shelf.element_type).unwrap();
    let label = shelf_type.sub_element("label").unwrap();
    assert!(next
        .element_type(&label.element_type)
        .unwrap()
        .has_attribute("lang"));
}
