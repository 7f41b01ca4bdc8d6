//! CLI entry point for maestro.
//!
//! This binary provides the `maestro` command: route a request to an expert
//! persona, explore sessions interactively or in batch, and inspect the
//! rule table and stored history.

mod batch;
mod cli;
mod config;
mod helpers;
mod personas;
mod repl;
mod runtime;
mod select;
mod sessions;

use anyhow::{Result, bail};
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::config::MaestroConfig;
use crate::helpers::init_tracing;
use crate::runtime::App;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Select { verbose: true, .. });
    init_tracing(if verbose { "debug" } else { "warn" });

    match cli.command {
        Commands::Select {
            request,
            verbose,
            session,
            json,
        } => {
            let request = request.join(" ");
            if request.trim().is_empty() {
                bail!("request text must not be empty");
            }
            let app = App::init(&cli.global).await?;
            select::cmd_select(&app, &request, verbose, session.as_deref(), json).await
        }
        Commands::Repl { session } => {
            let app = App::init(&cli.global).await?;
            repl::cmd_repl(&app, session.as_deref()).await
        }
        Commands::Batch { input } => {
            let app = App::init(&cli.global).await?;
            batch::cmd_batch(&app, &input).await
        }
        Commands::Personas { category } => {
            let config = MaestroConfig::resolve(&cli.global)?;
            personas::cmd_personas(&config, category.as_deref())
        }
        Commands::Check => {
            let config = MaestroConfig::resolve(&cli.global)?;
            personas::cmd_check(&config)
        }
        Commands::Sessions { action } => {
            let app = App::init(&cli.global).await?;
            sessions::cmd_sessions(&app, action).await
        }
        Commands::Stats { session } => {
            let app = App::init(&cli.global).await?;
            sessions::cmd_stats(&app, session.as_deref()).await
        }
    }
}
