//! Shared test doubles for the clock, the forward log and the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone};

use crate::clock::Clock;
use crate::forward::{Delivered, OutboundRequest, Transport, TransportError};
use crate::log::EventLog;

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    /// Local wall-clock time. Ambiguous times resolve to the earliest instant.
    pub fn ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        FixedClock(
            Local
                .with_ymd_and_hms(year, month, day, hour, min, sec)
                .earliest()
                .unwrap(),
        )
    }

    pub fn at_timestamp(secs: i64) -> Self {
        FixedClock(Local.timestamp_opt(secs, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// An [`EventLog`] that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<(String, bool)>>,
}

impl MemoryLog {
    pub fn all_messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn verbose_messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, verbose)| *verbose)
            .map(|(m, _)| m.clone())
            .collect()
    }
}

impl EventLog for MemoryLog {
    fn record(&self, message: &str, verbose: bool) {
        self.records
            .lock()
            .unwrap()
            .push((message.to_string(), verbose));
    }
}

#[derive(Debug, Default)]
struct Recording {
    failing: AtomicBool,
    sent: Mutex<Vec<OutboundRequest>>,
}

/// A [`Transport`] that records requests and succeeds or fails on demand.
///
/// Clones share state, so a test can keep a handle after moving one into the
/// code under test.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Recording>,
}

impl RecordingTransport {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests that reached [`Transport::send`], in order.
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.inner.sent.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<Delivered, TransportError> {
        self.inner.sent.lock().unwrap().push(request.clone());
        if self.inner.failing.load(Ordering::SeqCst) {
            Err(TransportError::Connect("connection refused".to_string()))
        } else {
            Ok(Delivered { status: 200 })
        }
    }
}
