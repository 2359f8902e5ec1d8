//! `coverscope list` command

use anyhow::Result;

use coverscope::cover::Action;

use crate::cli::ListArgs;
use crate::commands::registry_client;

pub fn execute(args: ListArgs) -> Result<()> {
    let client = registry_client(&args.center)?;
    let services = client.list_services()?;
    println!("{}", serde_json::to_string_pretty(&services)?);
    Ok(())
}
