//! decksync CLI
//!
//! Keeps a Gateway's admin API and its cloud control plane in agreement.

mod cli;
mod commands;
mod context;
mod error;
mod interactive;
mod render;

use clap::Parser;
use colored::Colorize;
use deck_core::sync::Direction;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::{Cli, Commands, SyncAction};
use context::DeckContext;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        println!("{} decksync", "deck".green().bold());
        println!();
        println!("Run {} for available commands.", "deck --help".cyan());
        return Ok(());
    };

    let cwd = std::env::current_dir()?;
    let ctx = DeckContext::load(&cwd, cli.config.as_deref(), &cli.connection)?;
    execute_command(&ctx, command)
}

/// Logs go to stderr so `--json` and `dump` output stay clean
fn init_tracing(verbose: bool) {
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(verbose);
    let result = if verbose {
        tracing::subscriber::set_global_default(builder.with_max_level(Level::DEBUG).finish())
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
    };
    if result.is_ok() {
        tracing::debug!("Verbose mode enabled");
    }
}

fn execute_command(ctx: &DeckContext, command: Commands) -> Result<()> {
    match command {
        Commands::Sync { action } => match action {
            SyncAction::Push(args) => commands::run_sync(ctx, Direction::Push, &args),
            SyncAction::Pull(args) => commands::run_sync(ctx, Direction::Pull, &args),
            SyncAction::Status {
                types,
                include_targets,
                json,
            } => commands::run_status(ctx, &types, include_targets, json),
            SyncAction::Rollback { sync_id, force } => {
                commands::run_rollback(ctx, &sync_id, force)
            }
            SyncAction::History { limit, json } => commands::run_history(ctx, limit, json),
        },
        Commands::Dump {
            selection,
            include_credentials,
            output,
            json,
        } => commands::run_dump(ctx, &selection, include_credentials, output.as_deref(), json),
        Commands::Diff {
            state,
            selection,
            json,
        } => commands::run_diff(ctx, &state, &selection, json),
        Commands::Apply {
            state,
            selection,
            dry_run,
        } => commands::run_apply(ctx, &state, &selection, dry_run),
    }
}
