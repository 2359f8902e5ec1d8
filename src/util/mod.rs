//! Shared utilities

pub mod config;
pub mod fs;
pub mod hash;
pub mod process;

pub use config::{Config, CoverConfig, CoverMode};
pub use process::{ProcessBuilder, ProcessRunner, SystemRunner};
