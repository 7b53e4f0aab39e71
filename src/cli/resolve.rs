use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Args)]
pub struct ResolveArgs {
    /// Path to resolve (need not exist)
    pub path: PathBuf,
}

pub fn run(args: ResolveArgs, config: &Config) -> Result<()> {
    let resolved = config.resolver().resolve(&args.path)?;

    println!("{}", resolved);
    if !resolved.exists() {
        println!(
            "  ({} trailing component(s) do not exist yet)",
            resolved.missing_components()
        );
    }
    Ok(())
}
