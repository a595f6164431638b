//! Library entrypoint for livedoc-collab so embedders can reuse the
//! relay and the session layer without shelling out to the daemon.

pub mod cli;
pub mod config;
pub mod protocol;
pub mod replica;
pub mod server;
pub mod session;

pub use protocol::{AwarenessState, ProtocolError, SyncFrame};
pub use replica::{ReplicaDoc, ReplicaError, SyncPacket};
pub use session::EditorSession;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::CollabConfig;

pub fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Run the relay daemon using CLI args (parsed by the caller).
pub async fn run_with_cli(cli: cli::Cli) -> Result<()> {
    init_tracing(cli.verbose)?;
    let cfg = CollabConfig::from_cli(&cli)?;
    server::serve(cfg).await
}
