//! The network seam of the forwarder.
//!
//! # What counts as failure
//!
//! Only transport-level outcomes: timeout, connection error, an error while
//! reading the response, or a deliberately forced failure. The HTTP status code
//! is recorded in [`Delivered`] for diagnostics but never inspected. A `500`
//! from the API is a successful delivery as far as the queue is concerned.
//! Changing this would silently change which events get replayed.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use super::ForwardRequest;
use crate::config::HttpVerb;
use crate::signing::RequestSignature;

/// Why an attempt did not reach the API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The invocation asked for the request to be queued without sending it.
    #[error("forced failure, request deferred to the queue")]
    Forced,

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    /// The response started but its body could not be read in time.
    #[error("reading response body failed: {0}")]
    Body(String),

    /// The HTTP client itself could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else if e.is_builder() {
            TransportError::Client(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// The API answered. The status is informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
}

/// The HTTP request actually put on the wire for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: HttpVerb,
    /// Full URL. For GET it includes the event query string.
    pub url: String,
    /// Form body for POST.
    pub body: Option<String>,
    pub headers: Vec<(&'static str, String)>,
}

impl OutboundRequest {
    /// Lays out `request` according to its verb and attaches `signature`.
    ///
    /// - GET: the query string is appended to the URL, no body.
    /// - POST: the URL is unchanged and the raw query string is the body.
    pub fn build(request: &ForwardRequest, signature: Option<&RequestSignature>) -> Self {
        let headers = signature
            .map(|sig| sig.headers().into_iter().collect())
            .unwrap_or_default();

        match request.verb() {
            HttpVerb::Get => {
                let url = if request.query().is_empty() {
                    request.url().to_string()
                } else {
                    let separator = if request.url().contains('?') { '&' } else { '?' };
                    format!("{}{separator}{}", request.url(), request.query())
                };
                OutboundRequest {
                    method: HttpVerb::Get,
                    url,
                    body: None,
                    headers,
                }
            }
            HttpVerb::Post => OutboundRequest {
                method: HttpVerb::Post,
                url: request.url().to_string(),
                body: Some(request.query().to_string()),
                headers,
            },
        }
    }
}

/// Sends one outbound request.
///
/// Implementations must not retry; a failed attempt is reported once and the
/// caller queues it.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &OutboundRequest,
    ) -> impl Future<Output = Result<Delivered, TransportError>> + Send;
}

/// [`Transport`] over `reqwest`, bounded by a total timeout.
///
/// The timeout covers connecting, sending and reading the response body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns `TransportError::Client` if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<Delivered, TransportError> {
        let mut builder = match request.method {
            HttpVerb::Get => self.client.get(&request.url),
            HttpVerb::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.body.clone().unwrap_or_default()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        response.bytes().await?;

        Ok(Delivered { status })
    }
}
