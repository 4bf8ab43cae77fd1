//! Sends one request and queues it on failure.

use std::sync::Arc;

use tracing::{debug, error};

use super::{ForwardRequest, OutboundRequest, Transport, TransportError};
use crate::clock::Clock;
use crate::log::EventLog;
use crate::queue::{QueueEntry, QueueStore};
use crate::signing::{RequestSignature, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::types::DayKey;

/// Performs single delivery attempts, persisting the failures.
pub struct Forwarder<T> {
    transport: T,
    store: QueueStore,
    clock: Arc<dyn Clock>,
    api_token: Option<String>,
}

impl<T: Transport> Forwarder<T> {
    pub fn new(
        transport: T,
        store: QueueStore,
        clock: Arc<dyn Clock>,
        api_token: Option<String>,
    ) -> Self {
        Forwarder {
            transport,
            store,
            clock,
            api_token: api_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Attempts `request` once. Returns whether it reached the API.
    ///
    /// With `force_failure` the network is skipped and the attempt is treated
    /// as failed. A failed attempt is appended to today's queue file with its
    /// bookkeeping updated. Problems while queueing are logged and swallowed;
    /// the return value only reports delivery.
    pub async fn forward(
        &self,
        request: &ForwardRequest,
        force_failure: bool,
        log: &dyn EventLog,
    ) -> bool {
        let now = self.clock.now();
        let timestamp = now.timestamp();

        log.record(
            &format!("Forward {} in {} mode", request.url(), request.verb()),
            false,
        );

        let signature = RequestSignature::sign(self.api_token.as_deref(), timestamp, request.url());
        if let Some(sig) = &signature {
            log.record(
                &format!(
                    "API token provided, add {TIMESTAMP_HEADER} ({}) and {SIGNATURE_HEADER} ({}) headers.",
                    sig.timestamp, sig.signature
                ),
                false,
            );
        }
        let outbound = OutboundRequest::build(request, signature.as_ref());

        let result = if force_failure {
            Err(TransportError::Forced)
        } else {
            self.transport.send(&outbound).await
        };

        match result {
            Ok(delivered) => {
                debug!(url = %outbound.url, status = delivered.status, "Forwarded");
                true
            }
            Err(e) => {
                self.enqueue(request, timestamp, &DayKey::from_datetime(&now), &e, log);
                false
            }
        }
    }

    fn enqueue(
        &self,
        request: &ForwardRequest,
        attempted_at: i64,
        day: &DayKey,
        cause: &TransportError,
        log: &dyn EventLog,
    ) {
        let (entry, bookkeeping) =
            match QueueEntry::for_failed_attempt(request.url(), request.query(), attempted_at) {
                Ok(built) => built,
                Err(e) => {
                    error!(error = %e, "Failed request cannot be queued, dropping it");
                    log.record(&format!("Request failed and cannot be queued: {e}"), true);
                    return;
                }
            };

        log.record(
            &format!("Request failed ({cause}), put url in queue: {entry}"),
            true,
        );
        if bookkeeping.timestamp_added {
            log.record("Add timestamp in url.", false);
        }
        if bookkeeping.retry_incremented {
            log.record(
                &format!("Change retry to retry={} in url.", bookkeeping.retry),
                false,
            );
        } else {
            log.record("Add retry=1 in url.", false);
        }

        match self.store.append(day, &entry) {
            Ok(path) => debug!(path = %path.display(), "Queued failed request"),
            Err(e) => {
                error!(error = %e, entry = %entry, "Failed to append to queue file");
                log.record(&format!("Cannot write queue file, event lost: {e}"), true);
            }
        }
    }
}
