//! Implementation of `coverscope build` and `coverscope run`.
//!
//! Both commands list the project, mirror it, instrument the mirror and then
//! hand the mirrored working directory to the Go toolchain.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::core::package::{main_packages, PackageGraph};
use crate::core::workspace::{Workspace, SEARCH_PATH_VAR};
use crate::ops::inject::{inject, Annotator, InjectError, InjectReport};
use crate::ops::list::{list_packages, ListError};
use crate::ops::mirror::{mirror_in, MirrorError};
use crate::util::config::CoverConfig;
use crate::util::process::{ProcessBuilder, ProcessRunner};

/// Error preparing or running a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("too many arguments: at most one package may be given")]
    TooManyArgs,

    #[error("invalid working directory")]
    InvalidWorkingDir,

    #[error("only `.` may be given as the package to build, got `{0}`")]
    WrongPackage(String),

    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Options for `build` and `run`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Original working directory.
    pub working_dir: PathBuf,
    /// Positional package arguments.
    pub packages: Vec<String>,
    /// Explicit output path (`-o`).
    pub output: Option<PathBuf>,
    /// Directory the workspace root is created in.
    pub workspace_base: PathBuf,
    /// Caller's search path.
    pub search_path: Option<OsString>,
    /// Go toolchain driver.
    pub go: PathBuf,
}

impl BuildOptions {
    /// Options taking the temp directory and search path from the environment.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        BuildOptions {
            working_dir: working_dir.into(),
            packages: Vec::new(),
            output: None,
            workspace_base: std::env::temp_dir(),
            search_path: std::env::var_os(SEARCH_PATH_VAR),
            go: PathBuf::from("go"),
        }
    }
}

/// Extra parameters of `go run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Program the binary is run with (`-exec`).
    pub exec: Option<String>,
    /// Arguments passed to the program.
    pub arguments: String,
}

/// A mirrored project ready to be instrumented and built.
#[derive(Debug)]
pub struct Build {
    pub graph: PackageGraph,
    pub workspace: Workspace,
    /// Binary produced by `go build`.
    pub target: PathBuf,
    packages: String,
    go: PathBuf,
}

/// Reject argument lists the mirror cannot serve.
pub fn check_parameters(packages: &[String], working_dir: &Path) -> Result<(), BuildError> {
    if packages.len() > 1 {
        tracing::error!("{}", BuildError::TooManyArgs);
        return Err(BuildError::TooManyArgs);
    }
    if working_dir.as_os_str().is_empty() {
        return Err(BuildError::InvalidWorkingDir);
    }
    match packages.first().map(String::as_str) {
        None | Some("") | Some(".") => {}
        Some(other) => return Err(BuildError::WrongPackage(other.to_string())),
    }
    info!("Working directory: {}", working_dir.display());
    Ok(())
}

/// Resolve where `go build` writes the binary.
///
/// An explicit output is made absolute against `working_dir`. Otherwise the
/// binary is named after the first entry point's install target, falling
/// back to its directory name, and placed in `working_dir`.
pub fn determine_output(graph: &PackageGraph, working_dir: &Path, output: Option<&Path>) -> PathBuf {
    if let Some(output) = output {
        return working_dir.join(output);
    }

    let name = main_packages(graph)
        .next()
        .and_then(|pkg| {
            pkg.target
                .as_deref()
                .filter(|t| !t.as_os_str().is_empty())
                .and_then(Path::file_name)
                .or_else(|| pkg.dir.file_name())
        })
        .map(PathBuf::from)
        .unwrap_or_default();
    working_dir.join(name)
}

impl Build {
    /// List and mirror the project.
    pub fn prepare(
        runner: &dyn ProcessRunner,
        opts: &BuildOptions,
        config: &CoverConfig,
    ) -> Result<Build, BuildError> {
        check_parameters(&opts.packages, &opts.working_dir)?;

        let graph = list_packages(runner, &opts.working_dir, &config.build_flags, None)?;
        let workspace = mirror_in(
            &opts.workspace_base,
            &graph,
            &opts.working_dir,
            &config.build_flags,
            opts.search_path.clone(),
        )?
        .with_debug(config.debug);
        let target = determine_output(&graph, &opts.working_dir, opts.output.as_deref());

        Ok(Build {
            graph,
            workspace,
            target,
            packages: opts.packages.join(" "),
            go: opts.go.clone(),
        })
    }

    /// Instrument the mirrored tree.
    pub fn instrument(
        &self,
        runner: &dyn ProcessRunner,
        annotator: &dyn Annotator,
        config: &CoverConfig,
    ) -> Result<InjectReport, BuildError> {
        Ok(inject(runner, annotator, &self.workspace, config)?)
    }

    fn go_command(&self, parts: &[&str]) -> ProcessBuilder {
        let go = shell_quote(&self.go.to_string_lossy());
        let line = std::iter::once(go.as_str())
            .chain(parts.iter().copied())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        ProcessBuilder::shell(line)
            .cwd(self.workspace.tmp_working_dir())
            .env_opt(SEARCH_PATH_VAR, self.workspace.search_path_env())
    }

    /// `go build <flags> -o <target> [packages]` in the mirrored working directory.
    pub fn build_command(&self) -> ProcessBuilder {
        let target = shell_quote(&self.target.to_string_lossy());
        self.go_command(&[
            "build",
            self.workspace.build_flags(),
            "-o",
            &target,
            &self.packages,
        ])
    }

    /// `go run <flags> [-exec X] [packages] <arguments>` in the mirrored working directory.
    pub fn run_command(&self, run: &RunOptions) -> ProcessBuilder {
        let exec = run
            .exec
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(|e| format!("-exec {}", e))
            .unwrap_or_default();
        let packages = if self.packages.is_empty() { "." } else { &self.packages };
        self.go_command(&[
            "run",
            self.workspace.build_flags(),
            &exec,
            packages,
            &run.arguments,
        ])
    }

    /// Compile the instrumented binary.
    pub fn build(&self, runner: &dyn ProcessRunner) -> Result<(), BuildError> {
        let cmd = self.build_command();
        info!("go build cmd is: {}", cmd.display_command());

        let output = runner.run(&cmd)?;
        if !output.success() {
            return Err(BuildError::Io(anyhow::anyhow!(
                "fail to execute `{}`: exit code {:?}\n{}",
                cmd.display_command(),
                output.code,
                output.stderr_lossy().trim_end()
            )));
        }
        info!("Go build exit successful.");
        Ok(())
    }

    /// Run the instrumented program with inherited stdio until it exits.
    pub fn run(&self, run: &RunOptions) -> Result<(), BuildError> {
        let cmd = self.run_command(run);
        info!("go run cmd is: {}", cmd.display_command());
        cmd.status_and_check()?;
        Ok(())
    }

    /// Remove the workspace unless debugging was requested.
    pub fn clean(&self) -> Result<(), BuildError> {
        self.workspace.teardown()?;
        Ok(())
    }
}

/// Quote `s` for `/bin/bash` when it contains anything but safe characters.
pub fn shell_quote(s: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c);
    if !s.is_empty() && s.chars().all(safe) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
