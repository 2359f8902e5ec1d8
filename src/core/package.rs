//! Package records as reported by the package lister.
//!
//! The lister emits one JSON object per package with Go-style field names.
//! Only the fields the mirror and the injector read are modelled; unknown
//! fields are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Declared name of entry-point packages.
pub const MAIN_PACKAGE: &str = "main";

/// Import identifier to package, in stable (sorted) order.
pub type PackageGraph = BTreeMap<String, Package>;

/// One compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Package {
    /// Directory containing the package sources
    pub dir: PathBuf,

    /// Import path of the package
    pub import_path: String,

    /// Declared package name
    pub name: String,

    /// Installed target (may be an executable)
    pub target: Option<PathBuf>,

    /// Workspace root, search-path entry or module root containing the package
    pub root: Option<PathBuf>,

    /// Module info; absent for legacy-flat projects
    pub module: Option<ModuleInfo>,

    /// Part of the standard library
    pub standard: bool,

    /// Ordinary source files
    pub go_files: Vec<String>,

    /// Interop (cgo) source files
    pub cgo_files: Vec<String>,

    /// All recursively imported dependencies
    pub deps: Vec<String>,

    /// Error loading the package
    pub error: Option<PackageError>,

    /// Errors loading dependencies
    pub deps_errors: Vec<PackageError>,
}

impl Package {
    /// Whether this package builds a standalone executable.
    pub fn is_main(&self) -> bool {
        self.name == MAIN_PACKAGE
    }

    /// Ordinary files followed by interop files, in lister order.
    pub fn source_files(&self) -> impl Iterator<Item = &str> {
        self.go_files
            .iter()
            .chain(self.cgo_files.iter())
            .map(String::as_str)
    }

    /// Workspace root, treating an empty string as absent.
    pub fn root(&self) -> Option<&Path> {
        self.root
            .as_deref()
            .filter(|root| !root.as_os_str().is_empty())
    }
}

/// Module (manifest) the package belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModuleInfo {
    /// Module path (declared identifier)
    pub path: String,

    /// Module version
    pub version: String,

    /// Is this the main module?
    pub main: bool,

    /// Directory holding the module's files
    pub dir: PathBuf,

    /// Path to the manifest file
    pub go_mod: Option<PathBuf>,

    /// Replacement of this module
    pub replace: Option<Box<ModuleInfo>>,
}

/// Error attached to a package record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PackageError {
    /// Shortest path from a listed package to this one
    pub import_stack: Vec<String>,

    /// Position of the error (file:line:col)
    pub pos: String,

    /// The error text
    pub err: String,
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pos.is_empty() {
            f.write_str(&self.err)
        } else {
            write!(f, "{}: {}", self.pos, self.err)
        }
    }
}

/// Iterate over entry-point packages in graph order.
pub fn main_packages(graph: &PackageGraph) -> impl Iterator<Item = &Package> {
    graph.values().filter(|pkg| pkg.is_main())
}
