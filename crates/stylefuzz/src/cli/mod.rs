//! CLI commands for Stylefuzz
//!
//! Every command reads and writes JSON files: schemas, recorded passes and
//! modifier lists. A summary goes to stdout, as JSON with `--json`.

pub mod apply;
pub mod consolidate;
pub mod evolve;
pub mod init;
pub mod inspect;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use stylefuzz_schema::{SchemaModifier, XmlSchema};

/// Read a schema and check its integrity before anything evolves it.
pub(crate) fn read_schema(path: &Path) -> Result<XmlSchema> {
    let schema = parse_schema(path)?;
    schema
        .validate()
        .with_context(|| format!("Invalid schema: {}", path.display()))?;
    Ok(schema)
}

/// Read a schema without checking it.
pub(crate) fn parse_schema(path: &Path) -> Result<XmlSchema> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema: {}", path.display()))?;
    XmlSchema::from_json(&json).with_context(|| format!("Invalid schema: {}", path.display()))
}

pub(crate) fn write_schema(path: &Path, schema: &XmlSchema) -> Result<()> {
    let json = schema.to_json().context("Failed to serialize schema")?;
    write_file(path, &json)
}

pub(crate) fn read_modifiers(path: &Path) -> Result<Vec<SchemaModifier>> {
    read_json(path)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json =
        fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    write_file(path, &json)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write: {}", path.display()))
}

/// Print `summary` as pretty JSON
pub(crate) fn print_json<T: Serialize>(summary: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
