//! End-to-End tests for schema evolution
//!
//! Tests the full round: recorded trace -> prepared pass -> evaluation ->
//! consolidation -> next schema version.
//! Uses REAL in-memory schemas - no mocks.

use std::sync::Arc;
use stylefuzz_evolution::{
    analyze_pass, evolve, AccessTrace, Axis, Expr, ExprRef, GenerationRequest, ModifierCoordinator,
    NodeTest, PreparedPass, RecordedPass, RuleTarget, SchemaProxy, TreeFactory,
};
use stylefuzz_ids::TraceId;
use stylefuzz_schema::{
    AttributeDefinition, ElementType, ModifierCollector, SchemaIndex, SchemaModificationProcessor,
    SchemaModifier, XmlSchema,
};

const URI: &str = "urn:test:shop";

fn root_path(steps: Vec<ExprRef>) -> ExprRef {
    Expr::path_of(std::iter::once(Expr::root()).chain(steps)).unwrap()
}

/// `shop` (root) > `product` (@sku)
fn shop_schema() -> XmlSchema {
    let mut schema = XmlSchema::new(URI, "shop.xsl");
    let shop = schema.add_element_type(ElementType::new());
    let product = schema.add_element_type(ElementType::new());
    schema.add_root_reference("shop", &shop);
    schema.add_sub_element(&shop, "product", &product).unwrap();
    schema
        .add_attribute(&product, AttributeDefinition::new("sku"))
        .unwrap();
    schema
}

fn prepare(schema: &XmlSchema, trace: AccessTrace, request: GenerationRequest) -> PreparedPass {
    let index = SchemaIndex::new(schema);
    RecordedPass { request, trace }.prepare(&index)
}

// =============================================================================
// STAGING
// =============================================================================

/// `/order/@id` on an empty schema stages a root `order` with a nested `id`.
#[test]
fn test_absolute_path_stages_root_with_nested_attribute() {
    let schema = XmlSchema::new(URI, "shop.xsl");
    let trace = AccessTrace::new().record(
        None,
        root_path(vec![Expr::child("order"), Expr::attribute("id")]),
    );
    let pass = prepare(&schema, trace, GenerationRequest::new(URI, 1));

    let mut sink: Vec<SchemaModifier> = Vec::new();
    let report = analyze_pass(&schema, &pass, &mut sink).unwrap();
    assert_eq!(report.modifiers, 2);
    assert_eq!(sink.len(), 1);

    match &sink[0] {
        SchemaModifier::AddElement(order) => {
            assert_eq!(order.name, "order");
            assert!(order.is_root());
            assert_eq!(order.attributes().len(), 1);
            assert_eq!(order.attributes()[0].name, "id");
        }
        other => panic!("unexpected {other:?}"),
    }
}

/// Reading the same position twice in one pass stages one modifier.
#[test]
fn test_repeated_access_is_memoized() {
    let schema = shop_schema();
    let shop_trace = TraceId::new();
    let request = GenerationRequest::new(URI, 1).with_rule(
        shop_trace.clone(),
        RuleTarget::Element {
            reference: schema.root_references[0].id.clone(),
        },
    );
    let trace = AccessTrace::new()
        .record(Some(shop_trace.clone()), Expr::child("banner"))
        .record(
            Some(shop_trace),
            Expr::value_of(Expr::path(Expr::child("banner"), Expr::literal("x"))),
        );
    let pass = prepare(&schema, trace, request);
    assert_eq!(pass.expression_count(), 2);

    let mut sink: Vec<SchemaModifier> = Vec::new();
    analyze_pass(&schema, &pass, &mut sink).unwrap();
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].name(), "banner");
}

/// Attribute access on the document root is a contract violation.
#[test]
fn test_attribute_access_on_document_fails() {
    let schema = shop_schema();
    let mut coordinator = ModifierCoordinator::new(&schema);
    assert!(coordinator
        .handle_attribute_access(&SchemaProxy::Document, "lang")
        .is_err());
}

// =============================================================================
// REWRITE
// =============================================================================

/// `descendant::variant[parent::product]` from `shop` stages `variant`
/// inside `product`.
#[test]
fn test_parent_filter_infers_containment() {
    let schema = shop_schema();
    let shop = SchemaProxy::element(&schema.root_references[0]);
    let filter = Expr::filter(
        Expr::step(Axis::Descendant, Some(NodeTest::element("variant"))),
        Expr::function(
            "exists",
            vec![Expr::step(Axis::Parent, Some(NodeTest::element("product")))],
        ),
    );

    let mut coordinator = ModifierCoordinator::new(&schema);
    TreeFactory::new()
        .build(&filter)
        .evaluate(&shop, &mut coordinator)
        .unwrap();
    let mut sink: Vec<SchemaModifier> = Vec::new();
    coordinator.flush(&mut sink).unwrap();

    assert_eq!(coordinator.accesses().len(), 2);
    assert_eq!(sink.len(), 1);
    match &sink[0] {
        SchemaModifier::AddElement(variant) => {
            assert_eq!(variant.name, "variant");
            assert_eq!(variant.element_id.as_ref(), Some(&schema.element_types[1].id));
        }
        other => panic!("unexpected {other:?}"),
    }
}

// =============================================================================
// CONSOLIDATION AND APPLY
// =============================================================================

/// Two passes staging the same `order` consolidate into one modifier.
#[test]
fn test_two_passes_consolidate() {
    let schema = XmlSchema::new(URI, "shop.xsl");
    let expr = root_path(vec![Expr::child("order"), Expr::attribute("id")]);
    let passes: Vec<PreparedPass> = (0..2)
        .map(|_| {
            prepare(
                &schema,
                AccessTrace::new().record(None, expr.clone()),
                GenerationRequest::new(URI, 1),
            )
        })
        .collect();

    let collector = ModifierCollector::new();
    for pass in &passes {
        let mut sink = &collector;
        analyze_pass(&schema, pass, &mut sink).unwrap();
    }
    let consolidated = collector.get_consolidated_modifiers().unwrap();
    assert_eq!(consolidated.len(), 1);
    assert_eq!(consolidated[0].name(), "order");
    assert_eq!(consolidated[0].count(), 2);
}

/// Passes touching different children of the same new element merge.
#[test]
fn test_evolve_merges_children_across_passes() {
    let schema = XmlSchema::new(URI, "shop.xsl");
    let passes = vec![
        prepare(
            &schema,
            AccessTrace::new().record(
                None,
                root_path(vec![Expr::child("order"), Expr::attribute("id")]),
            ),
            GenerationRequest::new(URI, 1),
        ),
        prepare(
            &schema,
            AccessTrace::new().record(
                None,
                root_path(vec![Expr::child("order"), Expr::child("total")]),
            ),
            GenerationRequest::new(URI, 1),
        ),
    ];

    let evolution = evolve(&schema, &passes, 2).unwrap();
    assert_eq!(evolution.modifiers.len(), 1);
    assert_eq!(evolution.schema.version, 2);
    assert_eq!(evolution.schema.root_references.len(), 1);

    let order = &evolution.schema.root_references[0];
    let order_type = evolution.schema.element_type(&order.element_type).unwrap();
    assert!(order_type.has_attribute("id"));
    assert!(order_type.has_sub_element("total"));
    evolution.schema.validate().unwrap();
}

/// A modifier for a sub-element the parent already declares is dropped.
#[test]
fn test_colliding_modifier_is_dropped() {
    let schema = shop_schema();
    let shop_type = schema.element_types[0].id.clone();
    let collision = SchemaModifier::from(stylefuzz_schema::AddElementModifier::new(
        URI,
        1,
        Some(shop_type),
        "product",
    ));

    let with_collision = SchemaModificationProcessor::apply(&schema, &[collision]).unwrap();
    let baseline = SchemaModificationProcessor::apply(&schema, &[]).unwrap();
    assert_eq!(with_collision, baseline);
    assert_eq!(with_collision.version, schema.version + 1);
}

/// Evolved schemas survive a JSON round trip and evolve again.
#[test]
fn test_second_round_on_evolved_schema() {
    let schema = shop_schema();
    let expr = root_path(vec![
        Expr::child("shop"),
        Expr::child("product"),
        Arc::new(Expr::Filter {
            base: Expr::child("price"),
            predicate: Expr::attribute("currency"),
        }),
    ]);
    let pass = prepare(
        &schema,
        AccessTrace::new().record(None, expr.clone()),
        GenerationRequest::new(URI, 1),
    );
    let first = evolve(&schema, &[pass], 1).unwrap();
    assert_eq!(first.applied.applied, 2);

    let reloaded = XmlSchema::from_json(&first.schema.to_json().unwrap()).unwrap();
    assert_eq!(reloaded, first.schema);

    let pass = prepare(
        &reloaded,
        AccessTrace::new().record(None, expr),
        GenerationRequest::new(URI, 2),
    );
    let second = evolve(&reloaded, &[pass], 1).unwrap();
    assert!(second.modifiers.is_empty());
    assert_eq!(second.schema.version, 3);
    assert_eq!(second.schema.element_types, reloaded.element_types);
}
