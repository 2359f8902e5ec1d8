//! High-level operations.
//!
//! This module contains the pipeline behind the coverscope commands:
//! list, mirror, inject, then build or run.

pub mod build;
pub mod handler;
pub mod inject;
pub mod list;
pub mod mirror;

pub use build::{Build, BuildError, BuildOptions, RunOptions};
pub use inject::{inject, Annotator, CommandAnnotator, InjectError, InjectReport};
pub use list::{list_packages, ListError};
pub use mirror::{mirror, MirrorError};
