//! Inspect command - summarize a schema and print its element tree

use crate::cli::{parse_schema, print_json};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use stylefuzz_ids::ElementTypeId;
use stylefuzz_schema::{ElementReference, XmlSchema};

/// Arguments for the inspect command
#[derive(Debug)]
pub struct InspectArgs {
    pub schema: PathBuf,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct InspectSummary {
    pub uri: String,
    pub stylesheet_uri: String,
    pub version: u32,
    pub element_types: usize,
    pub references: usize,
    pub attributes: usize,
    pub functions: usize,
    pub parameters: usize,
    pub roots: Vec<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

impl InspectSummary {
    pub fn of(schema: &XmlSchema) -> Self {
        let problem = schema.validate().err().map(|e| e.to_string());
        Self {
            uri: schema.uri.clone(),
            stylesheet_uri: schema.stylesheet_uri.clone(),
            version: schema.version,
            element_types: schema.element_types.len(),
            references: schema.reference_count(),
            attributes: schema.attribute_count(),
            functions: schema.functions.len(),
            parameters: schema.parameters.len(),
            roots: schema.root_references.iter().map(|r| r.name.clone()).collect(),
            valid: problem.is_none(),
            problem,
        }
    }
}

pub fn run(args: InspectArgs) -> Result<()> {
    let schema = parse_schema(&args.schema)?;
    let summary = InspectSummary::of(&schema);

    if args.json {
        return print_json(&summary);
    }

    println!("{} v{}", summary.uri, summary.version);
    println!("  Stylesheet: {}", summary.stylesheet_uri);
    println!(
        "  {} element type(s), {} reference(s), {} attribute(s)",
        summary.element_types, summary.references, summary.attributes
    );
    if let Some(problem) = &summary.problem {
        println!("  INVALID: {}", problem);
    }
    println!();

    let mut lines = Vec::new();
    let mut path = Vec::new();
    for reference in &schema.root_references {
        render_reference(&schema, reference, &mut path, &mut lines);
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Render `reference` and everything below it, one line per node.
///
/// Types already on `path` are marked recursive and not expanded again.
pub fn render_reference<'s>(
    schema: &'s XmlSchema,
    reference: &'s ElementReference,
    path: &mut Vec<&'s ElementTypeId>,
    lines: &mut Vec<String>,
) {
    let indent = "  ".repeat(path.len());
    let occurs = format!("[{}..{}]", reference.min_occurs, reference.max_occurs);

    let Some(element_type) = schema.element_type(&reference.element_type) else {
        lines.push(format!(
            "{}{} {} (missing type {})",
            indent,
            reference.name,
            occurs,
            reference.element_type.short()
        ));
        return;
    };

    if path.contains(&&element_type.id) {
        lines.push(format!("{}{} {} (recursive)", indent, reference.name, occurs));
        return;
    }

    let mut line = format!("{}{} {} {}", indent, reference.name, occurs, element_type.content_type);
    if let Some(comment) = &reference.comment {
        line.push_str(&format!("  # {}", comment));
    }
    lines.push(line);

    for attribute in &element_type.attributes {
        lines.push(format!("{}  @{}: {}", indent, attribute.name, attribute.datatype));
    }

    path.push(&element_type.id);
    for sub_element in &element_type.sub_elements {
        render_reference(schema, sub_element, path, lines);
    }
    path.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use stylefuzz_schema::{AttributeDefinition, ElementType};

    fn tree_schema() -> XmlSchema {
        let mut schema = XmlSchema::new("urn:test:tree", "tree.xsl");
        let node = schema.add_element_type(ElementType::new());
        let leaf = schema.add_element_type(ElementType::new());
        schema.add_root_reference("node", &node);
        schema.add_sub_element(&node, "leaf", &leaf).unwrap();
        schema
            .add_attribute(&node, AttributeDefinition::new("label"))
            .unwrap();
        schema
    }

    fn recursive_schema() -> XmlSchema {
        let mut schema = XmlSchema::new("urn:test:tree", "tree.xsl");
        let node = schema.add_element_type(ElementType::new());
        schema.add_root_reference("node", &node);
        schema.add_sub_element(&node, "node", &node).unwrap();
        schema
            .add_attribute(&node, AttributeDefinition::new("label"))
            .unwrap();
        schema
    }

    #[test]
    fn test_recursive_types_render_once() {
        let schema = recursive_schema();
        let mut lines = Vec::new();
        render_reference(&schema, &schema.root_references[0], &mut Vec::new(), &mut lines);

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("node "));
        assert!(lines[1].contains("@label"));
        assert!(lines[2].ends_with("(recursive)"));
    }

    #[test]
    fn test_summary_counts() {
        let schema = tree_schema();
        let summary = InspectSummary::of(&schema);
        assert_eq!(summary.element_types, 2);
        assert_eq!(summary.references, 2);
        assert_eq!(summary.attributes, 1);
        assert_eq!(summary.roots, vec!["node".to_string()]);
        assert!(summary.valid);
    }

    #[test]
    fn test_summary_reports_type_cycle() {
        let summary = InspectSummary::of(&recursive_schema());
        assert_eq!(summary.element_types, 1);
        assert!(!summary.valid);
        assert!(summary.problem.unwrap().contains("contains itself"));
    }

    #[test]
    fn test_summary_reports_dangling_reference() {
        let mut schema = tree_schema();
        schema.root_references[0].element_type = ElementTypeId::new();
        let summary = InspectSummary::of(&schema);
        assert!(!summary.valid);
        assert!(summary.problem.is_some());
    }
}
