//! Entry point for `tcp-mapper`.
//!
//! Parses CLI arguments and dispatches into either **serve** mode (the TCP
//! harness endpoint) or **repl** mode (a single session over stdin/stdout).
//! All protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, profile loading).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tcp_mapper::{adapter, MapperProfile, MappingSet};

/// Abstraction/concretization mapper for model-based protocol testing.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Window-policy profile document (JSON); built-in defaults when omitted.
    #[arg(short, long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve the query protocol over TCP, one session per connection.
    Serve {
        /// Local address to bind (e.g. 127.0.0.1:4444).
        #[arg(short, long, default_value = "127.0.0.1:4444")]
        bind: String,
    },
    /// Speak the query protocol on stdin/stdout (single session).
    Repl,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let profile = match &cli.profile {
        Some(path) => MapperProfile::from_path(path)
            .with_context(|| format!("loading profile {}", path.display()))?,
        None => MapperProfile::builtin(),
    };
    let mappings = Arc::new(MappingSet::new(profile));

    match cli.mode {
        Mode::Serve { bind } => {
            log::info!("starting harness endpoint on {bind}");
            adapter::serve(&bind, mappings).await?;
        }
        Mode::Repl => {
            adapter::repl(mappings)?;
        }
    }

    Ok(())
}
