mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{init, replay, show, InitArgs, ReplayArgs, ShowArgs};
use tracing_subscriber::EnvFilter;

/// Mindtree CLI - stage outline edits and commit them to a tree store
#[derive(Parser, Debug)]
#[command(name = "mindtree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new mindtree project
    Init(InitArgs),

    /// Print the outline of a tree snapshot
    Show(ShowArgs),

    /// Replay a script of staged edits and commits against a tree snapshot
    Replay(ReplayArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match std::env::current_dir() {
        Ok(cwd) => {
            let cwd = cwd.display().to_string();
            match cli.command {
                Command::Init(args) => init(args, &cwd),
                Command::Show(args) => show(args, &cwd).await,
                Command::Replay(args) => replay(args, &cwd).await,
            }
        }
        Err(err) => Err(anyhow::anyhow!("Cannot get current directory: {err}")),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
