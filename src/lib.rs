//! coverscope - whole-program runtime coverage for Go services
//!
//! This crate provides the core library functionality for coverscope:
//! mirroring a Go project into an isolated workspace, instrumenting every
//! entry point and the local packages it links, and the registry through
//! which running instrumented binaries report coverage.

pub mod core;
pub mod cover;
pub mod ops;
pub mod util;

/// Test utilities and mocks for coverscope unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted process runner and package
/// fixtures so no Go toolchain is needed.
#[cfg(test)]
pub mod test_support;

pub use core::{package::Package, workspace::Workspace};
pub use cover::{Action, HttpClient, MemoryStore, Store};
pub use util::config::CoverConfig;
