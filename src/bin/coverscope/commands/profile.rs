//! `coverscope profile` command

use std::io::Write;

use anyhow::{Context, Result};

use coverscope::cover::{Action, ProfileParam};

use crate::cli::ProfileArgs;
use crate::commands::registry_client;

pub fn execute(args: ProfileArgs) -> Result<()> {
    let client = registry_client(&args.center)?;
    let param = ProfileParam {
        force: args.force,
        ..ProfileParam::from(args.filter)
    };
    let profile = client.profile(&param)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &profile)
                .with_context(|| format!("failed to write profile to {}", path.display()))?;
            eprintln!("         Wrote {}", path.display());
        }
        None => std::io::stdout()
            .write_all(&profile)
            .context("failed to write profile")?,
    }
    Ok(())
}
