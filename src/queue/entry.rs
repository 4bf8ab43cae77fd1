//! Queue lines and the retry bookkeeping applied when an attempt fails.
//!
//! A queue line is a GET-style URL holding every original event parameter plus
//! two bookkeeping parameters:
//!
//! - `timestamp`: unix time of the first failed attempt, never overwritten
//! - `retry`: number of times the event has been queued so far
//!
//! Bookkeeping edits the raw query text in place. Parameters other than
//! `retry` keep their exact original encoding, so the receiving API sees the
//! same bytes the platform sent.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::config::HttpVerb;
use crate::forward::ForwardRequest;

const TIMESTAMP_PARAM: &str = "timestamp";
const RETRY_PARAM: &str = "retry";

/// A line that is not an absolute URL with a host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("not a valid URL ({reason}): {line}")]
pub struct InvalidEntry {
    pub line: String,
    pub reason: String,
}

/// What [`QueueEntry::for_failed_attempt`] changed in the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookkeeping {
    /// A `timestamp` parameter was appended.
    pub timestamp_added: bool,
    /// The `retry` value now stored in the entry.
    pub retry: u64,
    /// Whether `retry` existed before (and was incremented) or was appended.
    pub retry_incremented: bool,
}

/// One validated queue line, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    line: String,
}

impl QueueEntry {
    /// Builds the entry persisted after a failed attempt at `url` with `query`.
    ///
    /// `attempted_at` is used for `timestamp` when the query has none.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntry` if the resulting line would not be a valid URL.
    pub fn for_failed_attempt(
        url: &str,
        query: &str,
        attempted_at: i64,
    ) -> Result<(Self, Bookkeeping), InvalidEntry> {
        let query = escape_for_line(query);

        let has_timestamp = form_urlencoded::parse(query.as_bytes())
            .any(|(key, _)| key == TIMESTAMP_PARAM);
        // Later duplicates win, as in ordinary query parsing.
        let previous_retry = form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| key == RETRY_PARAM)
            .last()
            .map(|(_, value)| leading_integer(&value));

        let mut pairs: Vec<Cow<'_, str>> = if query.is_empty() {
            Vec::new()
        } else {
            query.split('&').map(Cow::Borrowed).collect()
        };

        if !has_timestamp {
            pairs.push(Cow::Owned(format!("{TIMESTAMP_PARAM}={attempted_at}")));
        }

        let retry = match previous_retry {
            Some(previous) => {
                let next = previous.saturating_add(1);
                for pair in pairs.iter_mut() {
                    if pair_key(pair).as_deref() == Some(RETRY_PARAM) {
                        *pair = Cow::Owned(format!("{RETRY_PARAM}={next}"));
                    }
                }
                next
            }
            None => {
                pairs.push(Cow::Owned(format!("{RETRY_PARAM}=1")));
                1
            }
        };

        let entry = QueueEntry::parse(&format!("{url}?{}", pairs.join("&")))?;
        Ok((
            entry,
            Bookkeeping {
                timestamp_added: !has_timestamp,
                retry,
                retry_incremented: previous_retry.is_some(),
            },
        ))
    }

    /// Parses one line read from a queue file. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntry` unless the line is an absolute URL with a scheme
    /// and a host, free of embedded whitespace.
    pub fn parse(line: &str) -> Result<Self, InvalidEntry> {
        let line = line.trim();
        let invalid = |reason: &str| InvalidEntry {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        if line.is_empty() {
            return Err(invalid("empty line"));
        }
        if line.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid("embedded whitespace"));
        }
        let url = Url::parse(line).map_err(|e| invalid(&e.to_string()))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host"));
        }

        Ok(QueueEntry {
            line: line.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// The URL without query string or fragment: `scheme://authority/path`.
    pub fn base_url(&self) -> &str {
        let end = self
            .line
            .find(['?', '#'])
            .unwrap_or(self.line.len());
        &self.line[..end]
    }

    /// The raw query string, empty when the line has none.
    pub fn query(&self) -> &str {
        let Some((_, rest)) = self.line.split_once('?') else {
            return "";
        };
        rest.split_once('#').map_or(rest, |(query, _)| query)
    }

    /// The request replaying this entry with `verb`.
    pub fn to_request(&self, verb: HttpVerb) -> ForwardRequest {
        ForwardRequest::new(self.base_url(), verb, self.query())
    }
}

impl fmt::Display for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

/// Percent-encodes the characters that would break the one-URL-per-line format.
fn escape_for_line(query: &str) -> Cow<'_, str> {
    let needs_escape = |c: char| c.is_whitespace() || c.is_control() || c == '#';
    if !query.chars().any(needs_escape) {
        return Cow::Borrowed(query);
    }

    let mut escaped = String::with_capacity(query.len() + 8);
    let mut utf8 = [0u8; 4];
    for c in query.chars() {
        if needs_escape(c) {
            for byte in c.encode_utf8(&mut utf8).bytes() {
                escaped.push_str(&format!("%{byte:02X}"));
            }
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

/// Decoded key of one raw `key=value` pair.
fn pair_key(pair: &str) -> Option<String> {
    form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
}

/// Integer prefix of a parameter value: `"3"` and `"3abc"` give 3, anything
/// without leading digits gives 0.
fn leading_integer(value: &str) -> u64 {
    let digits: String = value
        .trim_start()
        .trim_start_matches('+')
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(if digits.is_empty() { 0 } else { u64::MAX })
}
