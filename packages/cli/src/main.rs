mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, fmt, set, tree, CheckArgs, FmtArgs, SetArgs, TreeArgs, Workspace};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// hitedit - schema-aware editor for hierarchical block input files
#[derive(Parser, Debug)]
#[command(name = "hitedit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema catalog JSON (overrides hitedit.config.json)
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite input files in canonical form
    Fmt(FmtArgs),

    /// Parse input files and report problems
    Check(CheckArgs),

    /// Print the block tree of an input file
    Tree(TreeArgs),

    /// Set one parameter value
    Set(SetArgs),
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?.display().to_string();
    let workspace = Workspace::load(&cwd, cli.schema.as_deref())?;

    match cli.command {
        Command::Fmt(args) => fmt(args, &workspace),
        Command::Check(args) => check(args, &workspace),
        Command::Tree(args) => tree(args, &workspace),
        Command::Set(args) => set(args, &workspace),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
