//! Consolidate command - merge modifier lists from separate runs

use crate::cli::{print_json, read_modifiers, write_json};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use stylefuzz_schema::{count_modifiers, ModifierCollector};

/// Arguments for the consolidate command
#[derive(Debug)]
pub struct ConsolidateArgs {
    pub modifiers: Vec<PathBuf>,
    pub out: PathBuf,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct ConsolidateSummary {
    pub inputs: usize,
    pub collected: usize,
    pub consolidated: usize,
    pub top_level: usize,
    pub schema_uri: Option<String>,
    pub schema_version: Option<u32>,
    pub out: PathBuf,
}

pub fn run(args: ConsolidateArgs) -> Result<()> {
    let collector = ModifierCollector::new();
    let mut collected = 0;

    for path in &args.modifiers {
        let modifiers = read_modifiers(path)?;
        collected += count_modifiers(&modifiers);
        collector
            .add_all(modifiers)
            .with_context(|| format!("Cannot consolidate {}", path.display()))?;
    }

    let consolidated = collector.get_consolidated_modifiers()?;
    write_json(&args.out, &consolidated)?;

    let batch = collector.batch();
    let summary = ConsolidateSummary {
        inputs: args.modifiers.len(),
        collected,
        consolidated: count_modifiers(&consolidated),
        top_level: consolidated.len(),
        schema_uri: batch.as_ref().map(|(uri, _)| uri.clone()),
        schema_version: batch.map(|(_, version)| version),
        out: args.out,
    };

    if args.json {
        return print_json(&summary);
    }

    println!(
        "Consolidated {} modifier(s) from {} file(s) into {}",
        summary.collected, summary.inputs, summary.consolidated
    );
    if let (Some(uri), Some(version)) = (&summary.schema_uri, summary.schema_version) {
        println!("  Batch: {} v{}", uri, version);
    }
    println!("  Written to {}", summary.out.display());
    Ok(())
}
