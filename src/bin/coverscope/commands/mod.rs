//! Command implementations

pub mod build;
pub mod clean;
pub mod clear;
pub mod completions;
pub mod init;
pub mod list;
pub mod profile;
pub mod register;
pub mod remove;
pub mod run;
pub mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use coverscope::cover::{HttpClient, ProfileParam};
use coverscope::util::config::{
    global_config_path, load_config, project_config_path, Config, CoverOverrides, DEFAULT_CENTER,
};
use coverscope::util::process::{find_executable, find_go};
use coverscope::util::CoverConfig;

use crate::cli::{CenterArgs, CoverArgs, FilterArgs};

/// Merged global and project configuration for `dir`.
pub fn load_project_config(dir: &Path) -> Config {
    load_config(global_config_path().as_deref(), &project_config_path(dir))
}

pub fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("failed to determine current directory")
}

/// Freeze configuration files and command-line flags into one [`CoverConfig`].
pub fn cover_config(args: &CoverArgs, file: &Config) -> Result<CoverConfig> {
    CoverConfig::resolve(
        file,
        CoverOverrides {
            center: args.center.center.clone(),
            mode: args.mode,
            agent_port: args.agent_port.clone(),
            singleton: args.singleton,
            build_flags: args.build_flags.clone(),
            debug: args.debug,
        },
    )
}

/// Client for the registry named on the command line, in the config files, or the default.
pub fn registry_client(args: &CenterArgs) -> Result<HttpClient> {
    let host = match &args.center {
        Some(center) => center.clone(),
        None => {
            let config = load_project_config(&current_dir()?);
            config
                .cover
                .center
                .unwrap_or_else(|| DEFAULT_CENTER.to_string())
        }
    };
    tracing::debug!("registry: {}", host);
    HttpClient::new(&host).with_context(|| format!("invalid registry `{}`", host))
}

impl From<FilterArgs> for ProfileParam {
    fn from(args: FilterArgs) -> Self {
        ProfileParam {
            force: false,
            service: args.service,
            address: args.address,
        }
    }
}

/// Go driver from `GOROOT` or `PATH`; plain `go` when neither has one.
pub fn go_driver() -> PathBuf {
    find_go().unwrap_or_else(|| {
        tracing::warn!("go toolchain not found in GOROOT or PATH, trying `go`");
        PathBuf::from("go")
    })
}

/// Absolute path of the annotator program.
pub fn annotator_program(config: &CoverConfig) -> Result<PathBuf> {
    let program = &config.annotator;
    if program.components().count() > 1 {
        return Ok(program.clone());
    }
    let name = program.to_string_lossy();
    find_executable(&name).with_context(|| format!("annotator `{}` not found in PATH", name))
}

/// Print a registry response the way the registry worded it.
pub fn print_response(body: &[u8]) {
    let text = String::from_utf8_lossy(body);
    let text = text.trim_end();
    if !text.is_empty() {
        println!("{}", text);
    }
}
