//! One delivery attempt of an event to the external API.
//!
//! [`Forwarder::forward`] sends the request once through a [`Transport`] and,
//! if the transport fails, appends the request to the day's queue file. It
//! never retries in-process; the queue is the retry mechanism.

use crate::config::HttpVerb;

pub mod forwarder;
pub mod transport;

pub use forwarder::Forwarder;
pub use transport::{Delivered, HttpTransport, OutboundRequest, Transport, TransportError};

/// Destination, verb and raw query string of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    url: String,
    verb: HttpVerb,
    query: String,
}

impl ForwardRequest {
    pub fn new(url: impl Into<String>, verb: HttpVerb, query: impl Into<String>) -> Self {
        ForwardRequest {
            url: url.into(),
            verb,
            query: query.into(),
        }
    }

    /// Destination URL without the event query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn verb(&self) -> HttpVerb {
        self.verb
    }

    /// Raw, still url-encoded event parameters.
    pub fn query(&self) -> &str {
        &self.query
    }
}
