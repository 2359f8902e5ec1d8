//! Coverage injection.
//!
//! Walks every entry point of the mirrored tree, assigns counter variables
//! to the entry point and the local packages it links, runs the annotator
//! over each file and writes the generated glue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::cover_var::{declare_cover_vars, PackageCover};
use crate::core::package::{main_packages, Package, PackageGraph};
use crate::core::workspace::Workspace;
use crate::ops::handler::{render_global, render_handler, HandlerSpec, GLOBAL_FILE_NAME, HANDLER_FILE_NAME};
use crate::ops::list::{list_packages, ListError};
use crate::util::config::{CoverConfig, CoverMode};
use crate::util::fs::{ensure_dir, write_string};
use crate::util::process::{ProcessBuilder, ProcessRunner};

/// Error instrumenting the mirrored tree.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("target directory {} does not exist", path.display())]
    TargetMissing { path: PathBuf },

    #[error(transparent)]
    List(#[from] ListError),

    #[error("failed to instrument package {package}: {message}")]
    InjectionFailed { package: String, message: String },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// One file to instrument.
#[derive(Debug, Clone, Copy)]
pub struct Annotation<'a> {
    /// Absolute path of the source file, rewritten in place.
    pub file: &'a Path,
    /// Counter semantics.
    pub mode: CoverMode,
    /// Counter symbol assigned to the file.
    pub var: &'a str,
    /// Import path of the package the counter is declared in.
    pub global_import_path: &'a str,
}

/// Per-file source instrumenter.
///
/// Rewrites the file so its statements bump the assigned counter and
/// returns the counter's declaration text.
pub trait Annotator {
    fn annotate(&self, annotation: &Annotation<'_>) -> anyhow::Result<String>;
}

/// Runs an external annotator program.
///
/// The program is invoked as
/// `<program> -mode <mode> -var <var> -global <import path> <file>` and
/// prints the declaration on stdout.
pub struct CommandAnnotator<'a> {
    program: PathBuf,
    runner: &'a dyn ProcessRunner,
}

impl<'a> CommandAnnotator<'a> {
    pub fn new(program: impl Into<PathBuf>, runner: &'a dyn ProcessRunner) -> Self {
        CommandAnnotator {
            program: program.into(),
            runner,
        }
    }
}

impl Annotator for CommandAnnotator<'_> {
    fn annotate(&self, annotation: &Annotation<'_>) -> anyhow::Result<String> {
        let cmd = ProcessBuilder::new(&self.program)
            .args(["-mode", annotation.mode.as_str()])
            .args(["-var", annotation.var])
            .args(["-global", annotation.global_import_path])
            .arg(annotation.file);
        debug!("annotate: {}", cmd.display_command());

        let output = self.runner.run(&cmd)?;
        if !output.success() {
            bail!(
                "`{}` exited with {:?}: {}",
                cmd.display_command(),
                output.code,
                output.stderr_lossy().trim()
            );
        }
        String::from_utf8(output.stdout)
            .with_context(|| format!("annotator output for {} is not UTF-8", annotation.file.display()))
    }
}

/// Instrumentation of one entry point.
#[derive(Debug, Clone)]
pub struct ServiceCover {
    pub main: Arc<PackageCover>,
    /// Local dependencies, shared with other entry points that link them.
    pub deps: Vec<Arc<PackageCover>>,
    pub handler_file: PathBuf,
}

/// Result of an injection run.
#[derive(Debug, Clone)]
pub struct InjectReport {
    pub services: Vec<ServiceCover>,
    pub global_file: PathBuf,
    /// Import paths in the order they were instrumented.
    pub instrumented: Vec<String>,
}

struct Injector<'a> {
    annotator: &'a dyn Annotator,
    mode: CoverMode,
    global_import_path: String,
    declarations: String,
    seen: HashMap<String, Arc<PackageCover>>,
    instrumented: Vec<String>,
}

impl Injector<'_> {
    fn add_counters(&mut self, pkg: &Package) -> Result<Arc<PackageCover>, InjectError> {
        let vars = declare_cover_vars(pkg);
        for (file, var) in &vars {
            let path = pkg.dir.join(file);
            let decl = self
                .annotator
                .annotate(&Annotation {
                    file: &path,
                    mode: self.mode,
                    var: &var.var,
                    global_import_path: &self.global_import_path,
                })
                .map_err(|e| InjectError::InjectionFailed {
                    package: pkg.import_path.clone(),
                    message: format!("{}: {:#}", file, e),
                })?;
            self.declarations.push('\n');
            self.declarations.push_str(decl.trim_end());
            self.declarations.push('\n');
        }
        self.instrumented.push(pkg.import_path.clone());

        Ok(Arc::new(PackageCover {
            import_path: pkg.import_path.clone(),
            vars,
        }))
    }

    fn cover_deps(&mut self, graph: &PackageGraph, main: &Package) -> Result<Vec<Arc<PackageCover>>, InjectError> {
        let mut deps = Vec::new();
        for dep in &main.deps {
            if let Some(cover) = self.seen.get(dep) {
                deps.push(Arc::clone(cover));
                continue;
            }
            // only packages of the project itself; the standard library and
            // external modules are never listed
            let Some(dep_pkg) = graph.get(dep) else {
                continue;
            };
            if dep_pkg.standard {
                continue;
            }
            let cover = self.add_counters(dep_pkg)?;
            self.seen.insert(dep.clone(), Arc::clone(&cover));
            deps.push(cover);
        }
        Ok(deps)
    }
}

/// Instrument every entry point of the mirrored tree of `workspace`.
pub fn inject(
    runner: &dyn ProcessRunner,
    annotator: &dyn Annotator,
    workspace: &Workspace,
    config: &CoverConfig,
) -> Result<InjectReport, InjectError> {
    let target = workspace.tmp_dir();
    if !target.is_dir() {
        tracing::error!("target directory {} does not exist", target.display());
        return Err(InjectError::TargetMissing {
            path: target.to_path_buf(),
        });
    }

    let search_path = workspace.search_path_env();
    let graph = list_packages(runner, target, workspace.build_flags(), search_path.as_deref())?;

    let mut injector = Injector {
        annotator,
        mode: config.mode,
        global_import_path: workspace.cover_var_import_path(),
        declarations: String::new(),
        seen: HashMap::new(),
        instrumented: Vec::new(),
    };
    let center = config.center.as_str();
    let agent_port = config.agent_port.as_deref().unwrap_or_default();

    let mut services = Vec::new();
    for pkg in main_packages(&graph) {
        info!("handle package: {}", pkg.import_path);
        let main = injector.add_counters(pkg)?;
        let deps = injector.cover_deps(&graph, pkg)?;

        let spec = HandlerSpec {
            package_name: &pkg.name,
            mode: config.mode,
            center,
            singleton: config.singleton,
            agent_port,
            global_import_path: &injector.global_import_path,
        };
        let text = render_handler(&spec, std::iter::once(main.as_ref()).chain(deps.iter().map(Arc::as_ref)));
        let handler_file = pkg.dir.join(HANDLER_FILE_NAME);
        write_string(&handler_file, &text).map_err(|e| InjectError::InjectionFailed {
            package: pkg.import_path.clone(),
            message: format!("{:#}", e),
        })?;

        services.push(ServiceCover {
            main,
            deps,
            handler_file,
        });
    }

    let cover_dir = workspace.cover_var_dir();
    ensure_dir(&cover_dir)?;
    let global_file = cover_dir.join(GLOBAL_FILE_NAME);
    write_string(
        &global_file,
        &render_global(&workspace.cover_package_name(), &injector.declarations),
    )?;
    info!("global cover variables written to {}", global_file.display());

    Ok(InjectReport {
        services,
        global_file,
        instrumented: injector.instrumented,
    })
}
