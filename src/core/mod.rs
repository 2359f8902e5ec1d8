//! Core data structures for coverscope.
//!
//! This module contains the foundational types used throughout the tool:
//! - Package records reported by the lister
//! - Module manifests and replace directives
//! - The mirrored workspace
//! - Counter-variable naming

pub mod cover_var;
pub mod manifest;
pub mod package;
pub mod workspace;

pub use cover_var::{declare_cover_vars, CoverVar, PackageCover};
pub use manifest::{ManifestError, ModFile, Replace, MANIFEST_NAME};
pub use package::{ModuleInfo, Package, PackageError, PackageGraph};
pub use workspace::{Layout, Workspace};
