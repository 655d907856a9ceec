//! Chatloom CLI entry point.
//!
//! Binary name: `chatloom`
//!
//! Parses CLI arguments, sets up tracing, opens storage, then dispatches
//! to the appropriate command handler.

mod cli;
mod state;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use chatloom_core::storage::{InMemoryKvStore, KvStore};
use chatloom_infra::config::{data_dir, load_chat_config};
use chatloom_infra::sqlite::{DatabasePool, SqliteKvStore};
use chatloom_observe::tracing_setup::{init_tracing, shutdown_tracing};

use cli::chat::loop_runner::{ask_once, run_chat_loop, ChatOptions};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_filter(), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need storage
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "chatloom", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = data_dir();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("could not create {}", data_dir.display()))?;
    let config = load_chat_config(&data_dir).await;

    let result = if cli.ephemeral {
        let state = AppState::new(config, InMemoryKvStore::new());
        dispatch(&cli, &state, "in memory").await
    } else {
        let pool = DatabasePool::open_in(&data_dir)
            .await
            .context("could not open session database")?;
        let state = AppState::new(config, SqliteKvStore::new(pool));
        dispatch(&cli, &state, "sqlite").await
    };

    shutdown_tracing();
    result
}

async fn dispatch<K: KvStore>(
    cli: &Cli,
    state: &AppState<K>,
    storage_label: &'static str,
) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Chat {
            session,
            new,
            message: Some(message),
        } => {
            let session = if *new { None } else { session.as_deref() };
            ask_once(state, session, message, cli.json).await?;
        }

        Commands::Chat {
            session,
            new,
            message: None,
        } => {
            let options = ChatOptions {
                session: session.clone(),
                new: *new,
                storage_label,
            };
            run_chat_loop(state, options).await?;
        }

        Commands::Sessions => {
            cli::session::list_sessions(state, cli.json).await?;
        }

        Commands::Delete { session, force } => {
            cli::session::delete_session(state, session, *force, cli.json).await?;
        }

        Commands::SetKey { value, no_verify } => {
            cli::key::set_key(state, value.as_deref(), *no_verify, cli.json).await?;
        }

        // Handled before storage is opened.
        Commands::Completions { .. } => {}
    }

    Ok(())
}
