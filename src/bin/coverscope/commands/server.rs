//! `coverscope server` command

use anyhow::{Context, Result};

use coverscope::cover::{start_server, ServerState};
use coverscope::util::config::resolve_listen_addr;

use crate::cli::ServerArgs;
use crate::commands::{current_dir, load_project_config};

/// Listen address when neither the flag nor the config names one.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:7777";

pub fn execute(args: ServerArgs) -> Result<()> {
    let listen = match args.listen {
        Some(listen) => listen,
        None => load_project_config(&current_dir()?)
            .server
            .listen
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
    };
    let addr = resolve_listen_addr(&listen)?;
    let state = ServerState::in_memory()?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(start_server(addr, state))
}
