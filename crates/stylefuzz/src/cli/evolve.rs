//! Evolve command - replay recorded passes and write the next schema version

use crate::cli::{print_json, read_json, read_schema, write_json, write_schema};
use crate::config::EvolutionConfig;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use stylefuzz_evolution::{evolve, PreparedPass, RecordedPass};
use stylefuzz_schema::{count_modifiers, SchemaIndex};
use tracing::info;

/// Arguments for the evolve command
#[derive(Debug)]
pub struct EvolveArgs {
    pub schema: PathBuf,
    pub passes: Vec<PathBuf>,
    pub out: PathBuf,
    pub modifiers_out: Option<PathBuf>,
    pub workers: Option<usize>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct EvolveSummary {
    pub schema_uri: String,
    pub previous_version: u32,
    pub version: u32,
    pub passes: usize,
    pub expressions: usize,
    pub accesses: usize,
    pub staged: usize,
    pub discarded: usize,
    pub consolidated: usize,
    pub applied: usize,
    pub skipped: usize,
    pub out: PathBuf,
}

pub fn run(args: EvolveArgs, config: &EvolutionConfig) -> Result<()> {
    let schema = read_schema(&args.schema)?;
    let index = SchemaIndex::new(&schema);

    let mut prepared: Vec<PreparedPass> = Vec::with_capacity(args.passes.len());
    for path in &args.passes {
        let recorded: RecordedPass = read_json(path)?;
        prepared.push(recorded.prepare(&index));
    }

    let discarded: usize = prepared.iter().map(|p| p.discarded).sum();
    if discarded > 0 && config.fail_on_unresolved {
        bail!(
            "{} trace event(s) could not be mapped to a schema position (fail_on_unresolved is set)",
            discarded
        );
    }

    let workers = args.workers.unwrap_or(config.workers);
    let evolution = evolve(&schema, &prepared, workers)
        .with_context(|| format!("Failed to evolve {} v{}", schema.uri, schema.version))?;

    write_schema(&args.out, &evolution.schema)?;
    if let Some(path) = &args.modifiers_out {
        write_json(path, &evolution.modifiers)?;
    }
    info!(
        "Wrote {} v{} to {}",
        evolution.schema.uri,
        evolution.schema.version,
        args.out.display()
    );

    let summary = EvolveSummary {
        schema_uri: schema.uri.clone(),
        previous_version: schema.version,
        version: evolution.schema.version,
        passes: evolution.passes.passes,
        expressions: evolution.passes.expressions,
        accesses: evolution.passes.accesses,
        staged: evolution.passes.modifiers,
        discarded: evolution.passes.discarded,
        consolidated: count_modifiers(&evolution.modifiers),
        applied: evolution.applied.applied,
        skipped: evolution.applied.skipped,
        out: args.out,
    };

    if args.json {
        return print_json(&summary);
    }

    println!(
        "Evolved {} v{} -> v{}",
        summary.schema_uri, summary.previous_version, summary.version
    );
    println!(
        "  {} pass(es), {} expression(s), {} access(es)",
        summary.passes, summary.expressions, summary.accesses
    );
    println!(
        "  {} staged, {} after consolidation, {} applied, {} skipped",
        summary.staged, summary.consolidated, summary.applied, summary.skipped
    );
    if summary.discarded > 0 {
        println!("  {} trace event(s) discarded", summary.discarded);
    }
    println!("  Written to {}", summary.out.display());
    Ok(())
}
