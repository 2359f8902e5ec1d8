//! `coverscope init` command

use anyhow::Result;

use coverscope::cover::Action;

use crate::cli::InitArgs;
use crate::commands::{print_response, registry_client};

pub fn execute(args: InitArgs) -> Result<()> {
    let client = registry_client(&args.center)?;
    let body = client.init_system()?;
    print_response(&body);
    eprintln!("   Initialized {}", client.host());
    Ok(())
}
