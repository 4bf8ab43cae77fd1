//! Trigger endpoint: one inbound request is one event.

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::forward::Transport;
use crate::log::EventLog;
use crate::relay::{EventOutcome, InboundEvent};

/// Presence of this header queues the event without attempting delivery.
pub const FORCE_QUEUE_HEADER: &str = "x-force-queue";

/// Errors answered by the trigger endpoint.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The request carried no query string, so there is nothing to forward.
    #[error("no query string to forward")]
    MissingQuery,
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = match &self {
            ForwardError::MissingQuery => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Forwards the raw query string to the API.
///
/// # Response
///
/// - 200 OK: delivered; a drain pass is started in the background
/// - 202 Accepted: not delivered (or forced), the event is queued
/// - 400 Bad Request: empty or missing query string
///
/// The drain runs detached from the request so a large backlog never eats
/// into the caller's own timeout.
pub async fn forward_handler<T: Transport + 'static>(
    State(app_state): State<AppState<T>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<(StatusCode, &'static str), ForwardError> {
    let query = query.filter(|q| !q.is_empty());
    let event = InboundEvent::new(query.unwrap_or_default(), headers.contains_key(FORCE_QUEUE_HEADER));
    let log = app_state.log().with_debug(event.debug_requested());

    debug!(force_queue = event.force_queue(), "Received event");

    match app_state.relay().forward_event(&event, &log).await {
        EventOutcome::Delivered => {
            log.record("Request succeeded, check if a queue file exists.", false);
            let state = app_state.clone();
            tokio::spawn(async move {
                if let Err(e) = state.relay().drain(&log).await {
                    warn!(error = %e, "Background drain failed");
                    log.record(&format!("Cannot list queue files: {e}"), true);
                }
            });
            Ok((StatusCode::OK, "OK"))
        }
        EventOutcome::Queued => Ok((StatusCode::ACCEPTED, "Queued")),
        EventOutcome::Empty => Err(ForwardError::MissingQuery),
    }
}
