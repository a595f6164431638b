//! livedoc-collab: realtime document sync relay.
//!
//! A thin daemon hosting the per-document websocket rooms that
//! livedoc sessions connect to. Rooms merge updates into a
//! server-side replica so late joiners get one snapshot, not a
//! replay of history.

use anyhow::Result;
use clap::Parser;

use livedoc_collab::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    livedoc_collab::run_with_cli(cli).await
}
