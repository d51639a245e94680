//! Init command - write a configuration file with every default spelled out

use crate::config::EvolutionConfig;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Arguments for the init command
#[derive(Debug)]
pub struct InitArgs {
    pub path: PathBuf,
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "Config already exists: {} (use --force to overwrite)",
            args.path.display()
        );
    }

    EvolutionConfig::default().save(&args.path)?;
    println!("Wrote {}", args.path.display());
    Ok(())
}
