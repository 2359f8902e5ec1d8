//! coverscope CLI - whole-program runtime coverage for Go services

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("coverscope=debug")
    } else {
        EnvFilter::new("coverscope=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Build(args) => commands::build::execute(args),
        Commands::Run(args) => commands::run::execute(args),
        Commands::Server(args) => commands::server::execute(args),
        Commands::Init(args) => commands::init::execute(args),
        Commands::List(args) => commands::list::execute(args),
        Commands::Register(args) => commands::register::execute(args),
        Commands::Profile(args) => commands::profile::execute(args),
        Commands::Clear(args) => commands::clear::execute(args),
        Commands::Remove(args) => commands::remove::execute(args),
        Commands::Clean(args) => commands::clean::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
