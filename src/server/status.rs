//! Queue inspection endpoint for observability.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::AppState;
use crate::forward::Transport;
use crate::queue::{QueueError, QueueStatus};

#[derive(Debug, Error)]
#[error("cannot read queue: {0}")]
pub struct StatusError(#[from] QueueError);

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Returns the current queue counts as JSON.
///
/// ```ignore
/// GET /status HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"queued_files":1,"queued_lines":3,"claimed_files":4,"exhausted_claims":4}
/// ```
pub async fn status_handler<T: Transport + 'static>(
    State(app_state): State<AppState<T>>,
) -> Result<Json<QueueStatus>, StatusError> {
    Ok(Json(app_state.relay().status()?))
}
