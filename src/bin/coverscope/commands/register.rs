//! `coverscope register` command

use anyhow::Result;

use coverscope::cover::{Action, ServiceUnderTest};

use crate::cli::RegisterArgs;
use crate::commands::{print_response, registry_client};

pub fn execute(args: RegisterArgs) -> Result<()> {
    let client = registry_client(&args.center)?;
    let service = ServiceUnderTest {
        name: args.name,
        address: args.address,
    };
    let body = client.register_service(&service, args.ip_revise)?;
    print_response(&body);
    eprintln!("    Registered {} at {}", service.name, service.address);
    Ok(())
}
