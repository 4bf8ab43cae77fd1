//! Per-event control flow: forward once, and drain the backlog only when the
//! API proved reachable.

use std::fs;
use std::sync::Arc;

use tracing::warn;
use url::form_urlencoded;

use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::forward::{ForwardRequest, Forwarder, Transport};
use crate::log::EventLog;
use crate::queue::{self, DrainReport, MaintenanceReport, QueueDrainer, QueueStatus, QueueStore};

/// One inbound trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    query: String,
    force_queue: bool,
}

impl InboundEvent {
    /// `query` is the raw, url-encoded query string exactly as received.
    pub fn new(query: impl Into<String>, force_queue: bool) -> Self {
        InboundEvent {
            query: query.into(),
            force_queue,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Whether the caller asked for the request to be queued without sending.
    pub fn force_queue(&self) -> bool {
        self.force_queue
    }

    /// Whether the query asks for debug records in the forward log.
    ///
    /// The last `debug` parameter wins and its value is compared as a number,
    /// so `debug=1`, `debug=01` and `debug=1.0` all enable it.
    pub fn debug_requested(&self) -> bool {
        form_urlencoded::parse(self.query.as_bytes())
            .filter(|(key, _)| key == "debug")
            .last()
            .is_some_and(|(_, value)| value.trim().parse::<f64>().is_ok_and(|v| v == 1.0))
    }
}

/// How the immediate attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Delivered,
    Queued,
    /// The event had no query string; nothing was sent or queued.
    Empty,
}

/// Forwarder and drainer bound to one configuration.
pub struct Relay<T> {
    config: Arc<RelayConfig>,
    forwarder: Forwarder<T>,
}

impl<T: Transport> Relay<T> {
    pub fn new(config: RelayConfig, transport: T, clock: Arc<dyn Clock>) -> Self {
        let store = QueueStore::new(config.queue_dir(), config.processing_dir());
        let forwarder = Forwarder::new(
            transport,
            store,
            clock,
            config.api_token().map(String::from),
        );
        Relay {
            config: Arc::new(config),
            forwarder,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn forwarder(&self) -> &Forwarder<T> {
        &self.forwarder
    }

    pub fn store(&self) -> &QueueStore {
        self.forwarder.store()
    }

    /// Creates the queue, processing and log directories.
    pub fn prepare_dirs(&self) -> queue::Result<()> {
        self.store().ensure_dirs()?;
        fs::create_dir_all(self.config.log_dir())?;
        Ok(())
    }

    /// Makes the immediate attempt for `event`, without draining.
    pub async fn forward_event(&self, event: &InboundEvent, log: &dyn EventLog) -> EventOutcome {
        if event.query().is_empty() {
            log.record("No query string, nothing to forward.", true);
            return EventOutcome::Empty;
        }

        let request = ForwardRequest::new(self.config.api_url(), self.config.verb(), event.query());
        if event.force_queue() {
            log.record("Force queue requested, the request will not be sent.", false);
        }

        if self.forwarder.forward(&request, event.force_queue(), log).await {
            EventOutcome::Delivered
        } else {
            EventOutcome::Queued
        }
    }

    /// Runs one drain pass with the configured verb and pause.
    pub async fn drain(&self, log: &dyn EventLog) -> queue::Result<DrainReport> {
        QueueDrainer::new(&self.forwarder, self.config.verb(), self.config.replay_pause())
            .drain(log)
            .await
    }

    /// Forwards `event` and, if it was delivered, drains the queue.
    ///
    /// The drain report is `None` when the event was queued or the queue
    /// directory could not be listed (which is logged).
    pub async fn handle_event(
        &self,
        event: &InboundEvent,
        log: &dyn EventLog,
    ) -> (EventOutcome, Option<DrainReport>) {
        let outcome = self.forward_event(event, log).await;
        if outcome != EventOutcome::Delivered {
            return (outcome, None);
        }

        log.record("Request succeeded, check if a queue file exists.", false);
        match self.drain(log).await {
            Ok(report) => (outcome, Some(report)),
            Err(e) => {
                warn!(error = %e, "Drain failed");
                log.record(&format!("Cannot list queue files: {e}"), true);
                (outcome, None)
            }
        }
    }

    /// Applies the configured retention policy once.
    pub fn maintain(&self) -> queue::Result<MaintenanceReport> {
        queue::retention::apply_policy(self.store(), self.config.retention())
    }

    pub fn status(&self) -> queue::Result<QueueStatus> {
        self.store().status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpVerb;
    use crate::test_utils::{FixedClock, MemoryLog, RecordingTransport};
    use std::path::Path;
    use tempfile::tempdir;

    const API: &str = "https://api.example.com/push";

    fn relay(dir: &Path, transport: RecordingTransport) -> Relay<RecordingTransport> {
        let config = RelayConfig::new(API, dir.join("datas"), dir.join("logs")).unwrap();
        let relay = Relay::new(
            config,
            transport,
            Arc::new(FixedClock::at_timestamp(1_700_000_000)),
        );
        relay.prepare_dirs().unwrap();
        relay
    }

    #[test]
    fn debug_flag_is_read_from_query() {
        assert!(InboundEvent::new("value=1&debug=1", false).debug_requested());
        assert!(!InboundEvent::new("value=1&debug=0", false).debug_requested());
        assert!(!InboundEvent::new("value=1", false).debug_requested());
    }

    #[test]
    fn debug_flag_compares_numerically() {
        assert!(InboundEvent::new("debug=01", false).debug_requested());
        assert!(InboundEvent::new("debug=1.0", false).debug_requested());
        assert!(!InboundEvent::new("debug=yes", false).debug_requested());
    }

    #[test]
    fn last_debug_flag_wins() {
        assert!(!InboundEvent::new("debug=1&debug=0", false).debug_requested());
        assert!(InboundEvent::new("debug=0&debug=1", false).debug_requested());
    }

    #[tokio::test]
    async fn empty_query_is_neither_sent_nor_queued() {
        let dir = tempdir().unwrap();
        let transport = RecordingTransport::succeeding();
        let relay = relay(dir.path(), transport.clone());
        let log = MemoryLog::default();

        let (outcome, report) = relay.handle_event(&InboundEvent::new("", false), &log).await;

        assert_eq!(outcome, EventOutcome::Empty);
        assert!(report.is_none());
        assert!(transport.sent().is_empty());
        assert!(relay.store().list_queued().unwrap().is_empty());
        assert!(log.verbose_messages().iter().any(|m| m.contains("nothing to forward")));
    }

    #[test]
    fn prepare_dirs_creates_layout() {
        let dir = tempdir().unwrap();
        relay(dir.path(), RecordingTransport::succeeding());
        assert!(dir.path().join("datas/forwards/queued").is_dir());
        assert!(dir.path().join("datas/forwards/processed").is_dir());
        assert!(dir.path().join("logs").is_dir());
    }

    /// A delivered event drains the backlog.
    #[tokio::test]
    async fn delivered_event_triggers_drain() {
        let dir = tempdir().unwrap();
        let transport = RecordingTransport::succeeding();
        let relay = relay(dir.path(), transport.clone());
        std::fs::write(
            relay.store().queue_dir().join("20240101-push-requests.queue"),
            format!("{API}?value=old&timestamp=1&retry=1\n"),
        )
        .unwrap();

        let (outcome, report) = relay
            .handle_event(&InboundEvent::new("value=20.1&cmd_id=5", false), &MemoryLog::default())
            .await;

        assert_eq!(outcome, EventOutcome::Delivered);
        assert_eq!(report.unwrap().lines_delivered, 1);
        let bodies: Vec<_> = transport.sent().into_iter().filter_map(|r| r.body).collect();
        assert_eq!(bodies, vec!["value=20.1&cmd_id=5", "value=old&timestamp=1&retry=1"]);
        assert!(relay.store().list_queued().unwrap().is_empty());
    }

    #[tokio::test]
    async fn queued_event_does_not_drain() {
        let dir = tempdir().unwrap();
        let transport = RecordingTransport::succeeding();
        let relay = relay(dir.path(), transport.clone());
        std::fs::write(
            relay.store().queue_dir().join("20240101-push-requests.queue"),
            format!("{API}?value=old&retry=1\n"),
        )
        .unwrap();

        let (outcome, report) = relay
            .handle_event(&InboundEvent::new("value=1", true), &MemoryLog::default())
            .await;

        assert_eq!(outcome, EventOutcome::Queued);
        assert!(report.is_none());
        assert!(transport.sent().is_empty());
        assert_eq!(relay.status().unwrap().queued_files, 2);
    }

    #[tokio::test]
    async fn get_verb_is_configurable() {
        let dir = tempdir().unwrap();
        let transport = RecordingTransport::succeeding();
        let config = RelayConfig::new(API, dir.path().join("datas"), dir.path().join("logs"))
            .unwrap()
            .with_verb(HttpVerb::Get);
        let relay = Relay::new(config, transport.clone(), Arc::new(FixedClock::at_timestamp(0)));

        relay
            .forward_event(&InboundEvent::new("value=1", false), &MemoryLog::default())
            .await;

        assert_eq!(transport.sent()[0].url, format!("{API}?value=1"));
    }

    #[tokio::test]
    async fn maintain_with_default_policy_is_a_no_op() {
        let dir = tempdir().unwrap();
        let relay = relay(dir.path(), RecordingTransport::succeeding());
        assert_eq!(relay.maintain().unwrap(), MaintenanceReport::default());
    }
}
