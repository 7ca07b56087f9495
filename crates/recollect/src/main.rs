// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recollect - long-term memory for chat assistants.
//!
//! This is the binary entry point. It replays chat turns through the memory
//! pipeline, assembles context for a query, and inspects stored transcripts.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod context;
mod logging;
mod pipeline;
mod replay;
mod transcripts;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use recollect_config::RecollectConfig;
use recollect_core::RecollectError;
use tracing::error;

/// Recollect - long-term memory for chat assistants.
#[derive(Parser, Debug)]
#[command(name = "recollect", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed chat turns from a JSONL file through the memory pipeline.
    Replay {
        /// One turn per line: {"conversation_id", "role", "content", "timestamp"?}.
        file: PathBuf,
        /// Seal every replayed conversation after the last turn.
        #[arg(long)]
        close: bool,
    },
    /// Assemble the memory context for a query.
    Context {
        query: String,
        /// Candidates to retrieve before dedup and ranking.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Inspect stored transcripts.
    Transcripts {
        #[command(subcommand)]
        action: TranscriptsAction,
    },
    /// Manage Recollect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum TranscriptsAction {
    /// List transcripts, newest first.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one transcript.
    Show { filename: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration and print the effective values.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Option<RecollectConfig> {
    let loaded = match path {
        Some(path) => recollect_config::load_and_validate_path(path),
        None => recollect_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => Some(config),
        Err(errors) => {
            recollect_config::render_errors(&errors);
            None
        }
    }
}

async fn run(cli: Cli, config: RecollectConfig) -> Result<(), RecollectError> {
    match cli.command {
        Commands::Replay { file, close } => {
            replay::run_replay(&config, &file, close, cli.json).await
        }
        Commands::Context { query, top_k } => {
            context::run_context(&config, &query, top_k, cli.json).await
        }
        Commands::Transcripts { action } => match action {
            TranscriptsAction::List { limit } => transcripts::run_list(&config, limit).await,
            TranscriptsAction::Show { filename } => {
                transcripts::run_show(&config, &filename).await
            }
        },
        Commands::Config {
            action: ConfigAction::Check,
        } => {
            let body = if cli.json {
                serde_json::to_string_pretty(&config).map_err(RecollectError::storage)?
            } else {
                toml::to_string_pretty(&config).map_err(RecollectError::storage)?
            };
            eprintln!("recollect: config OK");
            println!("{body}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let Some(config) = load_config(cli.config.as_ref()) else {
        return ExitCode::FAILURE;
    };
    logging::init_tracing(&config.service.log_level);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_replay_with_global_flags() {
        let cli = Cli::try_parse_from([
            "recollect",
            "replay",
            "turns.jsonl",
            "--close",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Replay { file, close } => {
                assert_eq!(file, PathBuf::from("turns.jsonl"));
                assert!(close);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn transcripts_list_has_default_limit() {
        let cli = Cli::try_parse_from(["recollect", "transcripts", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Transcripts {
                action: TranscriptsAction::List { limit: 20 }
            }
        ));
    }
}
