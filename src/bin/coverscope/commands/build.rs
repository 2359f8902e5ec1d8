//! `coverscope build` command

use anyhow::Result;

use coverscope::ops::build::{Build, BuildOptions};
use coverscope::ops::inject::CommandAnnotator;
use coverscope::util::SystemRunner;

use crate::cli::BuildArgs;
use crate::commands::{annotator_program, cover_config, current_dir, go_driver, load_project_config};

pub fn execute(args: BuildArgs) -> Result<()> {
    let cwd = current_dir()?;
    let config = cover_config(&args.cover, &load_project_config(&cwd))?;

    let mut opts = BuildOptions::new(&cwd);
    opts.packages = args.packages;
    opts.output = args.output;
    opts.go = go_driver();

    let runner = SystemRunner;
    let build = Build::prepare(&runner, &opts, &config)?;

    let result = annotator_program(&config).and_then(|program| {
        let annotator = CommandAnnotator::new(program, &runner);
        let report = build.instrument(&runner, &annotator, &config)?;
        eprintln!(
            "  Instrumented {} packages for {} services",
            report.instrumented.len(),
            report.services.len()
        );
        build.build(&runner)?;
        Ok(())
    });
    build.clean()?;
    result?;

    eprintln!("      Finished {}", build.target.display());
    Ok(())
}
