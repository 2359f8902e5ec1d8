//! Workspace - the mirrored build tree.
//!
//! A Workspace is the isolated copy of a project that gets instrumented and
//! built. Its root is named after a hash of the original working directory,
//! so repeated runs on the same project reuse (after wiping) the same path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::fs::remove_dir_all_if_exists;
use crate::util::hash::short_hash;

/// Prefix of workspace root directory names.
pub const WORKSPACE_PREFIX: &str = "coverscope-build-";

/// Prefix of the generated global counter package.
pub const COVER_PACKAGE_PREFIX: &str = "coverscopebuild";

/// Search-path variable used by legacy-flat projects.
pub const SEARCH_PATH_VAR: &str = "GOPATH";

/// Source directory under a search-path entry.
pub const SOURCE_DIR: &str = "src";

/// Directory name of the workspace root for `working_dir`.
pub fn workspace_dir_name(working_dir: &Path) -> String {
    format!(
        "{}{}",
        WORKSPACE_PREFIX,
        short_hash(&working_dir.to_string_lossy())
    )
}

/// Package name of the global counter package for `working_dir`.
pub fn cover_package_name(working_dir: &Path) -> String {
    format!(
        "{}{}",
        COVER_PACKAGE_PREFIX,
        short_hash(&working_dir.to_string_lossy())
    )
}

/// How the original project resolves its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Self-contained manifest-rooted module.
    Module {
        /// Directory holding the manifest.
        root: PathBuf,
        /// Declared module path.
        path: String,
    },
    /// Flat workspace under a recognized search-path root.
    Legacy {
        /// The search-path entry containing the project.
        root: PathBuf,
    },
    /// Legacy project outside any recognized root.
    Standalone,
}

impl Layout {
    /// Whether dependencies are resolved through a manifest.
    pub fn is_module(&self) -> bool {
        matches!(self, Layout::Module { .. })
    }
}

/// The mirrored build tree of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Original working directory.
    working_dir: PathBuf,

    /// Deterministic workspace root.
    tmp_dir: PathBuf,

    /// Mirrored equivalent of `working_dir`.
    tmp_working_dir: PathBuf,

    /// Project layout.
    layout: Layout,

    /// Global counter package directory, relative to `tmp_dir`.
    cover_var_dir: PathBuf,

    /// Search path for dependent builds, `None` in manifest mode.
    search_path: Option<OsString>,

    /// Flags forwarded to the lister and the compiler.
    build_flags: String,

    /// Keep the workspace on teardown.
    debug: bool,
}

impl Workspace {
    pub(crate) fn new(
        working_dir: PathBuf,
        tmp_dir: PathBuf,
        tmp_working_dir: PathBuf,
        layout: Layout,
        build_flags: String,
    ) -> Self {
        let cover_var_dir = Path::new(SOURCE_DIR).join(cover_package_name(&working_dir));
        Workspace {
            working_dir,
            tmp_dir,
            tmp_working_dir,
            layout,
            cover_var_dir,
            search_path: None,
            build_flags,
            debug: false,
        }
    }

    /// Keep the workspace on disk after [`Workspace::teardown`].
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub(crate) fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Get the original working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Get the workspace root.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Get the mirrored working directory.
    pub fn tmp_working_dir(&self) -> &Path {
        &self.tmp_working_dir
    }

    /// Get the project layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Whether the project is manifest-rooted.
    pub fn is_module(&self) -> bool {
        self.layout.is_module()
    }

    /// Get the build flags.
    pub fn build_flags(&self) -> &str {
        &self.build_flags
    }

    /// Absolute directory of the global counter package.
    pub fn cover_var_dir(&self) -> PathBuf {
        self.tmp_dir.join(&self.cover_var_dir)
    }

    /// Import path of the global counter package as seen by the compiler.
    pub fn cover_var_import_path(&self) -> String {
        match &self.layout {
            Layout::Module { path, .. } => {
                format!("{}/{}", path, self.cover_var_dir.to_string_lossy())
            }
            Layout::Legacy { .. } | Layout::Standalone => cover_package_name(&self.working_dir),
        }
    }

    /// Package name of the global counter package.
    pub fn cover_package_name(&self) -> String {
        cover_package_name(&self.working_dir)
    }

    /// Search-path override for dependent builds.
    pub fn search_path(&self) -> Option<&OsString> {
        self.search_path.as_ref()
    }

    /// Search-path override as a UTF-8 string, for process environments.
    pub fn search_path_env(&self) -> Option<String> {
        self.search_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Delete the workspace root unless debugging was requested.
    pub fn teardown(&self) -> Result<()> {
        if self.debug {
            tracing::info!("keeping workspace for inspection: {}", self.tmp_dir.display());
            return Ok(());
        }
        remove_dir_all_if_exists(&self.tmp_dir)
    }
}
