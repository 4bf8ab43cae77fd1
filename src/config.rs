//! Immutable relay configuration.
//!
//! Built once at startup (see [`crate::cli`]) and shared read-only by every
//! component. Nothing in the crate reads configuration from globals.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Timeout the home-automation platform applies to its own push call.
///
/// The forward timeout must stay below it, otherwise the platform retries and
/// the same event is forwarded several times.
pub const CALLER_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on one forward attempt.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause between two replayed queue lines.
pub const DEFAULT_REPLAY_PAUSE: Duration = Duration::from_micros(500);

/// Errors detected while validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid API URL {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("unsupported HTTP method {0:?} (expected GET or POST)")]
    UnsupportedMethod(String),

    #[error("forward timeout must be greater than zero")]
    ZeroTimeout,

    #[error("forward timeout {timeout:?} must be shorter than the caller timeout {caller:?}")]
    TimeoutTooLong { timeout: Duration, caller: Duration },
}

/// HTTP verb used to forward events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVerb {
    Get,
    #[default]
    Post,
}

impl FromStr for HttpVerb {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpVerb::Get),
            "POST" => Ok(HttpVerb::Post),
            _ => Err(ConfigError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVerb::Get => write!(f, "GET"),
            HttpVerb::Post => write!(f, "POST"),
        }
    }
}

/// What happens to claimed files once they are no longer needed.
///
/// Both knobs default to `None`, which keeps every drained and every orphaned
/// claim on disk forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    /// Exhausted claims older than this are deleted.
    pub exhausted_claims: Option<Duration>,
    /// Unfinished claims older than this are returned to the queue.
    pub orphan_reclaim_after: Option<Duration>,
}

/// Validated configuration for one relay process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    api_url: String,
    api_token: Option<String>,
    verb: HttpVerb,
    forward_timeout: Duration,
    replay_pause: Duration,
    data_dir: PathBuf,
    log_dir: PathBuf,
    retention: RetentionPolicy,
}

impl RelayConfig {
    /// Creates a configuration with default timeouts and retention.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidApiUrl` unless `api_url` is an absolute
    /// http(s) URL with a host.
    pub fn new(
        api_url: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let api_url = api_url.into();
        validate_api_url(&api_url)?;
        Ok(RelayConfig {
            api_url,
            api_token: None,
            verb: HttpVerb::default(),
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
            replay_pause: DEFAULT_REPLAY_PAUSE,
            data_dir: data_dir.into(),
            log_dir: log_dir.into(),
            retention: RetentionPolicy::default(),
        })
    }

    /// Sets the shared signing secret. An empty token disables signing.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.api_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_verb(mut self, verb: HttpVerb) -> Self {
        self.verb = verb;
        self
    }

    /// Sets the bound on a single forward attempt.
    ///
    /// # Errors
    ///
    /// The timeout must be non-zero and strictly shorter than [`CALLER_TIMEOUT`].
    pub fn with_forward_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if timeout >= CALLER_TIMEOUT {
            return Err(ConfigError::TimeoutTooLong {
                timeout,
                caller: CALLER_TIMEOUT,
            });
        }
        self.forward_timeout = timeout;
        Ok(self)
    }

    pub fn with_replay_pause(mut self, pause: Duration) -> Self {
        self.replay_pause = pause;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn verb(&self) -> HttpVerb {
        self.verb
    }

    pub fn forward_timeout(&self) -> Duration {
        self.forward_timeout
    }

    pub fn replay_pause(&self) -> Duration {
        self.replay_pause
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Directory holding the day-partitioned queue files.
    pub fn queue_dir(&self) -> PathBuf {
        self.data_dir.join("forwards").join("queued")
    }

    /// Sibling directory holding claimed queue files.
    pub fn processing_dir(&self) -> PathBuf {
        self.data_dir.join("forwards").join("processed")
    }
}

fn validate_api_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query string or fragment"));
    }
    Ok(())
}
