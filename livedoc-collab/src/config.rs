use anyhow::Result;

use crate::cli::Cli;

/// Runtime configuration derived from CLI/env.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    pub listen_addr: String,
    pub room_capacity: usize,
}

impl CollabConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        Ok(Self {
            listen_addr: cli.listen_addr.clone(),
            room_capacity: cli.room_capacity.max(1),
        })
    }
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8787".to_string(),
            room_capacity: 64,
        }
    }
}
