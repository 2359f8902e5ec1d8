//! `coverscope remove` command

use anyhow::Result;

use coverscope::cover::Action;

use crate::cli::RemoveArgs;
use crate::commands::{print_response, registry_client};

pub fn execute(args: RemoveArgs) -> Result<()> {
    let client = registry_client(&args.center)?;
    let body = client.remove(&args.filter.into())?;
    print_response(&body);
    Ok(())
}
