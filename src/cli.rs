//! Command-line interface.
//!
//! Every relay setting can also come from a `PUSH_RELAY_*` environment
//! variable, so the same binary works as a one-shot command spawned by the
//! platform and as a long-running server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, HttpVerb, RelayConfig, RetentionPolicy};

/// push-relay: forward home-automation events, queue the ones that fail.
#[derive(Parser, Debug)]
#[command(name = "push-relay")]
#[command(about = "Forward events to an HTTP API with a durable on-disk retry queue")]
pub struct Cli {
    #[command(flatten)]
    pub relay: RelayArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
    /// Destination API URL (http or https, no query string).
    #[arg(long, env = "PUSH_RELAY_API_URL")]
    pub api_url: String,

    /// Shared secret for request signing. Empty disables signing.
    #[arg(long, env = "PUSH_RELAY_API_TOKEN", default_value = "", hide_env_values = true)]
    pub api_token: String,

    /// HTTP verb used to forward events (get or post).
    #[arg(long, env = "PUSH_RELAY_API_METHOD", default_value = "post")]
    pub method: HttpVerb,

    /// Timeout for one forward attempt, in milliseconds.
    #[arg(long, env = "PUSH_RELAY_TIMEOUT_MS", default_value = "1000")]
    pub timeout_ms: u64,

    /// Pause between two replays of queued events, in microseconds.
    #[arg(long, env = "PUSH_RELAY_REPLAY_PAUSE_MICROS", default_value = "500")]
    pub replay_pause_micros: u64,

    /// Root of the queue directories.
    #[arg(long, env = "PUSH_RELAY_DATA_DIR", default_value = "./datas")]
    pub data_dir: PathBuf,

    /// Directory of the daily forward logs.
    #[arg(long, env = "PUSH_RELAY_LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Delete fully replayed queue files after this many hours.
    /// Unset keeps them forever.
    #[arg(long, env = "PUSH_RELAY_CLAIM_RETENTION_HOURS")]
    pub claim_retention_hours: Option<u64>,

    /// Return claims abandoned by a killed drain to the queue after this many
    /// minutes. Unset leaves them in place. Replayed events may be delivered
    /// twice.
    #[arg(long, env = "PUSH_RELAY_ORPHAN_RECLAIM_MINUTES")]
    pub orphan_reclaim_minutes: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server; each request is one event.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "PUSH_RELAY_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },

    /// Forward one event, then drain the queue if it was delivered.
    Forward {
        /// Raw url-encoded query string of the event.
        #[arg(long)]
        query: String,

        /// Queue the event without attempting delivery.
        #[arg(long)]
        force_queue: bool,
    },

    /// Run one drain pass over the queue.
    Drain,

    /// Apply the retention policy once.
    Maintain,
}

impl RelayArgs {
    /// Validates the arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an invalid API URL or timeout.
    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let retention = RetentionPolicy {
            exhausted_claims: self
                .claim_retention_hours
                .map(|h| Duration::from_secs(h.saturating_mul(3600))),
            orphan_reclaim_after: self
                .orphan_reclaim_minutes
                .map(|m| Duration::from_secs(m.saturating_mul(60))),
        };

        RelayConfig::new(self.api_url, self.data_dir, self.log_dir)?
            .with_api_token(self.api_token)
            .with_verb(self.method)
            .with_replay_pause(Duration::from_micros(self.replay_pause_micros))
            .with_retention(retention)
            .with_forward_timeout(Duration::from_millis(self.timeout_ms))
    }
}
