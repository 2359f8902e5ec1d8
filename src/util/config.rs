//! Configuration for coverscope.
//!
//! Two optional TOML files are read:
//! - Global: `~/.coverscope/config.toml` - User-wide defaults
//! - Project: `.coverscope/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both. The merged result is frozen into a
//! [`CoverConfig`] that is handed to the pipeline by reference.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default registry the instrumented services report to.
pub const DEFAULT_CENTER: &str = "http://127.0.0.1:7777";

/// Default external annotator program.
pub const DEFAULT_ANNOTATOR: &str = "coverscope-annotate";

/// Counter semantics requested from the annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverMode {
    /// Whether each statement ran.
    Set,
    /// How many times each statement ran.
    #[default]
    Count,
    /// Like `count`, safe for concurrent goroutines.
    Atomic,
}

impl CoverMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverMode::Set => "set",
            CoverMode::Count => "count",
            CoverMode::Atomic => "atomic",
        }
    }
}

impl fmt::Display for CoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "count" => Ok(CoverMode::Count),
            "set" => Ok(CoverMode::Set),
            "atomic" => Ok(CoverMode::Atomic),
            _ => Err(format!(
                "unknown mode '{}'; expected 'set', 'count', or 'atomic'",
                s
            )),
        }
    }
}

/// Validate an agent listen address of the form `host:port` (host may be empty).
pub fn parse_agent_port(s: &str) -> Result<Option<String>> {
    if s.is_empty() {
        return Ok(None);
    }
    let (_, port) = s
        .rsplit_once(':')
        .with_context(|| format!("invalid agent port `{}`: missing port in address", s))?;
    if port.parse::<u16>().is_err() {
        bail!("invalid agent port `{}`: bad port `{}`", s, port);
    }
    Ok(Some(s.to_string()))
}

/// On-disk configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrumentation settings
    pub cover: CoverSection,

    /// Registry server settings
    pub server: ServerSection,
}

/// `[cover]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverSection {
    /// Registry URL the instrumented binary registers with
    pub center: Option<String>,

    /// Coverage mode (set, count, atomic)
    pub mode: Option<CoverMode>,

    /// Fixed listen address for the instrumented binary's agent
    pub agent_port: Option<String>,

    /// Do not register with the center
    pub singleton: Option<bool>,

    /// Flags forwarded to the package lister and compiler
    pub build_flags: Option<String>,

    /// Per-file annotator program
    pub annotator: Option<PathBuf>,

    /// Keep the mirrored workspace after the run
    pub debug: Option<bool>,
}

/// `[server]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address of `coverscope server`
    pub listen: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        let cover = other.cover;
        if cover.center.is_some() {
            self.cover.center = cover.center;
        }
        if cover.mode.is_some() {
            self.cover.mode = cover.mode;
        }
        if cover.agent_port.is_some() {
            self.cover.agent_port = cover.agent_port;
        }
        if cover.singleton.is_some() {
            self.cover.singleton = cover.singleton;
        }
        if cover.build_flags.is_some() {
            self.cover.build_flags = cover.build_flags;
        }
        if cover.annotator.is_some() {
            self.cover.annotator = cover.annotator;
        }
        if cover.debug.is_some() {
            self.cover.debug = cover.debug;
        }
        if other.server.listen.is_some() {
            self.server.listen = other.server.listen;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.coverscope/config.toml)
/// 2. Global config (~/.coverscope/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }
    config.merge(Config::load_or_default(project_path));

    config
}

/// Get the global config directory (~/.coverscope).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".coverscope"))
}

/// Get the global config path (~/.coverscope/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.coverscope/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".coverscope").join("config.toml")
}

/// Immutable settings for one instrumentation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverConfig {
    /// Registry URL the instrumented binary registers with.
    pub center: Url,
    /// Counter semantics.
    pub mode: CoverMode,
    /// Skip registration with the center.
    pub singleton: bool,
    /// Fixed agent listen address; `None` picks a random port at runtime.
    pub agent_port: Option<String>,
    /// Flags forwarded verbatim to the lister and the compiler.
    pub build_flags: String,
    /// Keep the mirrored workspace for inspection.
    pub debug: bool,
    /// Per-file annotator program.
    pub annotator: PathBuf,
}

impl Default for CoverConfig {
    fn default() -> Self {
        CoverConfig {
            center: default_center(),
            mode: CoverMode::default(),
            singleton: false,
            agent_port: None,
            build_flags: String::new(),
            debug: false,
            annotator: PathBuf::from(DEFAULT_ANNOTATOR),
        }
    }
}

fn default_center() -> Url {
    Url::parse(DEFAULT_CENTER).expect("default center is a valid URL")
}

/// Command-line values that override the configuration files.
#[derive(Debug, Clone, Default)]
pub struct CoverOverrides {
    pub center: Option<String>,
    pub mode: Option<CoverMode>,
    pub agent_port: Option<String>,
    pub singleton: bool,
    pub build_flags: Option<String>,
    pub debug: bool,
}

impl CoverConfig {
    /// Freeze file configuration plus command-line overrides.
    pub fn resolve(file: &Config, overrides: CoverOverrides) -> Result<Self> {
        let defaults = CoverConfig::default();

        let center = match overrides.center.or_else(|| file.cover.center.clone()) {
            Some(raw) => Url::parse(&raw).with_context(|| format!("invalid center URL `{}`", raw))?,
            None => defaults.center,
        };
        let agent_port = match overrides
            .agent_port
            .or_else(|| file.cover.agent_port.clone())
        {
            Some(raw) => parse_agent_port(&raw)?,
            None => None,
        };

        Ok(CoverConfig {
            center,
            mode: overrides.mode.or(file.cover.mode).unwrap_or(defaults.mode),
            singleton: overrides.singleton || file.cover.singleton.unwrap_or(false),
            agent_port,
            build_flags: overrides
                .build_flags
                .or_else(|| file.cover.build_flags.clone())
                .unwrap_or_default(),
            debug: overrides.debug || file.cover.debug.unwrap_or(false),
            annotator: file.cover.annotator.clone().unwrap_or(defaults.annotator),
        })
    }
}

/// Resolve a listen address such as `127.0.0.1:7777` or `localhost:0`.
pub fn resolve_listen_addr(raw: &str) -> Result<SocketAddr> {
    raw.to_socket_addrs()
        .with_context(|| format!("invalid listen address `{}`", raw))?
        .next()
        .with_context(|| format!("listen address `{}` resolved to nothing", raw))
}
