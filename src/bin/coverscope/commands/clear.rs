//! `coverscope clear` command

use anyhow::Result;

use coverscope::cover::Action;

use crate::cli::ClearArgs;
use crate::commands::{print_response, registry_client};

pub fn execute(args: ClearArgs) -> Result<()> {
    let client = registry_client(&args.center)?;
    let body = client.clear(&args.filter.into())?;
    print_response(&body);
    Ok(())
}
