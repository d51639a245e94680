//! Apply command - rebuild a schema from a consolidated modifier list

use crate::cli::{print_json, read_modifiers, read_schema, write_schema};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use stylefuzz_schema::{count_modifiers, SchemaModificationProcessor};

/// Arguments for the apply command
#[derive(Debug)]
pub struct ApplyArgs {
    pub schema: PathBuf,
    pub modifiers: PathBuf,
    pub out: PathBuf,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct ApplySummary {
    pub schema_uri: String,
    pub previous_version: u32,
    pub version: u32,
    pub modifiers: usize,
    pub applied: usize,
    pub skipped: usize,
    pub out: PathBuf,
}

pub fn run(args: ApplyArgs) -> Result<()> {
    let schema = read_schema(&args.schema)?;
    let modifiers = read_modifiers(&args.modifiers)?;

    let (next, report) = SchemaModificationProcessor::apply_with_report(&schema, &modifiers)
        .with_context(|| format!("Failed to apply {}", args.modifiers.display()))?;
    write_schema(&args.out, &next)?;

    let summary = ApplySummary {
        schema_uri: next.uri.clone(),
        previous_version: schema.version,
        version: next.version,
        modifiers: count_modifiers(&modifiers),
        applied: report.applied,
        skipped: report.skipped,
        out: args.out,
    };

    if args.json {
        return print_json(&summary);
    }

    println!(
        "Applied {} of {} modifier(s) to {} v{} -> v{} ({} skipped)",
        summary.applied,
        summary.modifiers,
        summary.schema_uri,
        summary.previous_version,
        summary.version,
        summary.skipped
    );
    println!("  Written to {}", summary.out.display());
    Ok(())
}
