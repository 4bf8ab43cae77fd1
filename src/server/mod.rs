//! HTTP server for the relay.
//!
//! # Endpoints
//!
//! - `GET /` and `GET /forward` - Forward the query string to the API (200 delivered, 202 queued)
//! - `GET /status` - Returns queue counts as JSON
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

pub mod forward;
pub mod health;
pub mod status;

pub use forward::{FORCE_QUEUE_HEADER, ForwardError, forward_handler};
pub use health::health_handler;
pub use status::status_handler;

use crate::forward::Transport;
use crate::log::DailyFileLog;
use crate::relay::Relay;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
pub struct AppState<T> {
    inner: Arc<AppStateInner<T>>,
}

struct AppStateInner<T> {
    relay: Relay<T>,

    /// Forward log; each request derives its own copy with its debug flag.
    log: DailyFileLog,
}

// Manual impl: `T` itself need not be `Clone`.
impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> AppState<T> {
    pub fn new(relay: Relay<T>, log: DailyFileLog) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { relay, log }),
        }
    }

    pub fn relay(&self) -> &Relay<T> {
        &self.inner.relay
    }

    pub fn log(&self) -> &DailyFileLog {
        &self.inner.log
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<T: Transport + 'static>(app_state: AppState<T>) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/", get(forward_handler::<T>))
        .route("/forward", get(forward_handler::<T>))
        .route("/status", get(status_handler::<T>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
