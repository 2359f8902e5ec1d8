//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use coverscope::util::CoverMode;

/// coverscope - collect runtime coverage from running Go services
#[derive(Parser)]
#[command(name = "coverscope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the current project with coverage instrumentation
    Build(BuildArgs),

    /// Run the current project with coverage instrumentation and a local registry
    Run(RunArgs),

    /// Start a registry server
    Server(ServerArgs),

    /// Discard every registration and start a new collection round
    Init(InitArgs),

    /// List registered services
    List(ListArgs),

    /// Register a service instance with the registry
    Register(RegisterArgs),

    /// Fetch the merged coverage profile of registered services
    Profile(ProfileArgs),

    /// Reset coverage counters of registered services
    Clear(ClearArgs),

    /// Deregister services from the registry
    Remove(RemoveArgs),

    /// Remove the build workspace of the current directory
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct CenterArgs {
    /// Registry URL
    #[arg(long, env = "COVERSCOPE_CENTER")]
    pub center: Option<String>,
}

/// Instrumentation flags shared by `build` and `run`.
#[derive(Args, Debug, Clone, Default)]
pub struct CoverArgs {
    #[command(flatten)]
    pub center: CenterArgs,

    /// Coverage mode: set, count or atomic
    #[arg(long)]
    pub mode: Option<CoverMode>,

    /// Listen address of the coverage agent inside the binary, e.g. `:8100`
    #[arg(long = "agentport")]
    pub agent_port: Option<String>,

    /// Do not register with the registry
    #[arg(long)]
    pub singleton: bool,

    /// Flags passed through to `go list` and `go build`
    #[arg(long = "buildflags", allow_hyphen_values = true)]
    pub build_flags: Option<String>,

    /// Keep the build workspace for inspection
    #[arg(long)]
    pub debug: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub cover: CoverArgs,

    /// Output path of the instrumented binary
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Package to build (only `.` is supported)
    pub packages: Vec<String>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub cover: CoverArgs,

    /// Run the binary through this program (`go run -exec`)
    #[arg(long)]
    pub exec: Option<String>,

    /// Arguments passed to the program
    #[arg(long, allow_hyphen_values = true, default_value = "")]
    pub arguments: String,

    /// Package to run (only `.` is supported)
    pub packages: Vec<String>,
}

#[derive(Args)]
pub struct ServerArgs {
    /// Listen address
    #[arg(long)]
    pub listen: Option<String>,
}

#[derive(Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub center: CenterArgs,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub center: CenterArgs,
}

#[derive(Args)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub center: CenterArgs,

    /// Service name
    #[arg(long)]
    pub name: String,

    /// Service address, e.g. `http://10.0.0.1:8100`
    #[arg(long)]
    pub address: String,

    /// Let the registry replace the address host with the caller's IP
    #[arg(long)]
    pub ip_revise: bool,
}

/// Instance selection shared by `profile`, `clear` and `remove`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Select instances by service name
    #[arg(long)]
    pub service: Vec<String>,

    /// Select instances by address
    #[arg(long)]
    pub address: Vec<String>,
}

#[derive(Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub center: CenterArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Skip instances that cannot be reached
    #[arg(long)]
    pub force: bool,

    /// Write the profile to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ClearArgs {
    #[command(flatten)]
    pub center: CenterArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub center: CenterArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Project directory whose workspace is removed (defaults to current directory)
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
