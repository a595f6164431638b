use clap::Parser;

/// CLI for the livedoc sync relay daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "livedoc-collab", about = "Realtime document sync relay for livedoc")]
pub struct Cli {
    /// Listen address for HTTP/WS endpoints
    #[arg(long, env = "LIVEDOC_COLLAB_ADDR", default_value = "127.0.0.1:8787")]
    pub listen_addr: String,

    /// Per-room broadcast channel capacity
    #[arg(long, env = "LIVEDOC_ROOM_CAPACITY", default_value = "64")]
    pub room_capacity: usize,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}
