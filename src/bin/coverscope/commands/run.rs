//! `coverscope run` command
//!
//! Starts an in-process registry, then builds and runs the instrumented
//! program against it unless `--center` or the `[cover]` config table names
//! another registry.

use anyhow::{Context, Result};
use url::Url;

use coverscope::cover::server::spawn_background;
use coverscope::ops::build::{Build, BuildOptions, RunOptions};
use coverscope::ops::inject::CommandAnnotator;
use coverscope::util::config::Config;
use coverscope::util::SystemRunner;

use crate::cli::RunArgs;
use crate::commands::{annotator_program, cover_config, current_dir, go_driver, load_project_config};

const LOCAL_REGISTRY: &str = "127.0.0.1:0";

pub fn execute(args: RunArgs) -> Result<()> {
    let cwd = current_dir()?;
    let file = load_project_config(&cwd);
    let mut config = cover_config(&args.cover, &file)?;

    if uses_local_registry(args.cover.center.center.as_deref(), &file) {
        let local = spawn_background(LOCAL_REGISTRY.parse()?)?;
        let center = format!("http://{}", local);
        config.center = Url::parse(&center).with_context(|| format!("invalid center URL `{}`", center))?;
        eprintln!("      Registry {}", config.center);
    }

    let mut opts = BuildOptions::new(&cwd);
    opts.packages = args.packages;
    opts.go = go_driver();

    let run = RunOptions {
        exec: args.exec,
        arguments: args.arguments,
    };

    let runner = SystemRunner;
    let build = Build::prepare(&runner, &opts, &config)?;

    let result = annotator_program(&config).and_then(|program| {
        let annotator = CommandAnnotator::new(program, &runner);
        build.instrument(&runner, &annotator, &config)?;
        build.run(&run)?;
        Ok(())
    });
    build.clean()?;
    result
}

/// No registry named by flag, environment or config file.
fn uses_local_registry(flag: Option<&str>, file: &Config) -> bool {
    flag.is_none() && file.cover.center.is_none()
}
