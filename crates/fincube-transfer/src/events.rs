//! # Audit Events
//!
//! One event per settled cross-organization transfer, delivered
//! at-least-once to an [`EventSink`].
//!
//! ## Delivery
//!
//! [`EventPublisher::publish`] enqueues on a bounded channel with
//! `try_send` and returns at once: a slow or failing sink never delays or
//! fails the transfer that produced the event. A background task drains
//! the queue, retrying each event with exponential backoff up to the
//! configured attempt budget. Sinks must tolerate duplicates; the
//! transaction hash identifies an event.
//!
//! No event is discarded. One the queue refuses, or one that exhausts its
//! attempts, lands in the [`DeadLetterQueue`], where an operator lists it,
//! persists it and replays it into a sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fincube_core::{
    CanonicalBytes, CanonicalizationError, FieldElement, SettlementAddress, Timestamp, UserId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EventConfig;

/// The record published after a successful on-chain settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub transaction_hash: String,
    pub signer_address: SettlementAddress,
    pub chain_id: u64,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    /// Whole token units.
    pub amount: u64,
    pub sender_address: SettlementAddress,
    pub receiver_address: SettlementAddress,
    pub block_number: u64,
    pub gas_used: u64,
    pub memo: String,
    pub nullifier: FieldElement,
}

impl AuditEvent {
    /// JCS encoding, the wire form for every sink.
    pub fn canonical(&self) -> Result<CanonicalBytes, CanonicalizationError> {
        CanonicalBytes::new(self)
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("event encoding failed: {0}")]
    Encoding(#[from] CanonicalizationError),

    #[error("event delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &AuditEvent) -> Result<(), EventError>;
}

/// Writes each event to the structured log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, event: &AuditEvent) -> Result<(), EventError> {
        let payload = event.canonical()?;
        tracing::info!(
            target: "fincube::audit",
            tx_hash = %event.transaction_hash,
            payload = %payload.as_str(),
            "settlement audit event"
        );
        Ok(())
    }
}

/// POSTs each event as canonical JSON to a webhook.
#[derive(Debug)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EventError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EventError::Delivery(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    async fn deliver(&self, event: &AuditEvent) -> Result<(), EventError> {
        let body = event.canonical()?.into_bytes();
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| EventError::Delivery(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(EventError::Delivery(format!(
                "webhook answered HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Keeps delivered events in memory. Optionally fails the first
/// `failures` deliveries.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AuditEvent>>,
    failures: Mutex<u32>,
    attempts: Mutex<u32>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, event: &AuditEvent) -> Result<(), EventError> {
        *self.attempts.lock() += 1;
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(EventError::Delivery("injected failure".to_string()));
            }
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// What happened to the audit event of a settled transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Accepted by the delivery queue.
    Queued,
    /// Refused by the queue and kept in the dead-letter backlog.
    DeadLettered,
    /// No publisher configured.
    Disabled,
}

/// An audit event that has not reached its sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndeliveredEvent {
    pub event: AuditEvent,
    /// The most recent reason delivery did not happen.
    pub reason: String,
    /// Delivery attempts so far.
    pub attempts: u32,
    pub recorded_at: Timestamp,
}

/// Outcome of a replay pass, keyed by transaction hash.
#[derive(Debug, Default, Serialize)]
pub struct ReplayReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Backlog of audit events awaiting delivery.
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    entries: Mutex<Vec<UndeliveredEvent>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue holding a previously listed backlog.
    pub fn restore(entries: Vec<UndeliveredEvent>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub(crate) fn record(&self, event: AuditEvent, reason: String, attempts: u32) {
        metrics::counter!("fincube_audit_events_total", "result" => "dead_lettered").increment(1);
        tracing::warn!(
            tx_hash = %event.transaction_hash,
            attempts,
            "audit event moved to dead-letter backlog: {reason}"
        );
        self.entries.lock().push(UndeliveredEvent {
            event,
            reason,
            attempts,
            recorded_at: Timestamp::now(),
        });
    }

    /// Snapshot of the backlog, oldest first.
    pub fn list(&self) -> Vec<UndeliveredEvent> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Deliver every backlogged event once. Failures go back into the
    /// backlog with their new reason. Entries are taken out of the backlog
    /// before delivery, so concurrent replays never send the same entry.
    pub async fn replay(&self, sink: &dyn EventSink) -> ReplayReport {
        let claimed = std::mem::take(&mut *self.entries.lock());
        let mut report = ReplayReport::default();
        let mut retained = Vec::new();
        for mut entry in claimed {
            let tx_hash = entry.event.transaction_hash.clone();
            match sink.deliver(&entry.event).await {
                Ok(()) => {
                    metrics::counter!("fincube_audit_events_total", "result" => "delivered")
                        .increment(1);
                    report.delivered.push(tx_hash);
                }
                Err(e) => {
                    entry.attempts += 1;
                    entry.reason = e.to_string();
                    report.failed.push((tx_hash, entry.reason.clone()));
                    retained.push(entry);
                }
            }
        }
        if !retained.is_empty() {
            let mut entries = self.entries.lock();
            let recorded_since = std::mem::take(&mut *entries);
            *entries = retained;
            entries.extend(recorded_since);
        }
        report
    }
}

/// Non-blocking handle onto the delivery queue.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<AuditEvent>,
    dead_letters: Arc<DeadLetterQueue>,
}

impl EventPublisher {
    /// Start the delivery task. It runs until every publisher handle is
    /// dropped and the queue is drained.
    pub fn spawn(sink: Arc<dyn EventSink>, config: &EventConfig) -> (Self, JoinHandle<()>) {
        Self::spawn_with_dead_letters(sink, config, Arc::new(DeadLetterQueue::new()))
    }

    /// Like [`EventPublisher::spawn`], recording undelivered events into a
    /// shared backlog.
    pub fn spawn_with_dead_letters(
        sink: Arc<dyn EventSink>,
        config: &EventConfig,
        dead_letters: Arc<DeadLetterQueue>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = tokio::spawn(deliver_loop(
            rx,
            sink,
            dead_letters.clone(),
            config.max_attempts.max(1),
            config.base_delay,
        ));
        (Self { tx, dead_letters }, handle)
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dead_letters
    }

    /// Queue an event. Never waits; an event the queue refuses goes to the
    /// dead-letter backlog.
    pub fn publish(&self, event: AuditEvent) -> AuditStatus {
        let (event, reason) = match self.tx.try_send(event) {
            Ok(()) => return AuditStatus::Queued,
            Err(mpsc::error::TrySendError::Full(event)) => (event, "audit event queue full"),
            Err(mpsc::error::TrySendError::Closed(event)) => {
                (event, "audit event publisher closed")
            }
        };
        self.dead_letters.record(event, reason.to_string(), 0);
        AuditStatus::DeadLettered
    }
}

async fn deliver_loop(
    mut rx: mpsc::Receiver<AuditEvent>,
    sink: Arc<dyn EventSink>,
    dead_letters: Arc<DeadLetterQueue>,
    max_attempts: u32,
    base_delay: Duration,
) {
    while let Some(event) = rx.recv().await {
        if let Err((attempts, reason)) =
            deliver_with_retry(sink.as_ref(), &event, max_attempts, base_delay).await
        {
            dead_letters.record(event, reason, attempts);
        }
    }
}

/// Deliver one event, doubling the delay after each failed attempt. On
/// failure returns the attempts made and the last error.
async fn deliver_with_retry(
    sink: &dyn EventSink,
    event: &AuditEvent,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<(), (u32, String)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match sink.deliver(event).await {
            Ok(()) => {
                metrics::counter!("fincube_audit_events_total", "result" => "delivered")
                    .increment(1);
                return Ok(());
            }
            Err(e @ EventError::Encoding(_)) => {
                metrics::counter!("fincube_audit_events_total", "result" => "failed").increment(1);
                return Err((attempt, e.to_string()));
            }
            Err(e) if attempt >= max_attempts => {
                metrics::counter!("fincube_audit_events_total", "result" => "failed").increment(1);
                return Err((attempt, e.to_string()));
            }
            Err(e) => {
                let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    tx_hash = %event.transaction_hash,
                    attempt,
                    max_attempts,
                    "audit event delivery failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(tx: &str) -> AuditEvent {
        AuditEvent {
            transaction_hash: tx.to_string(),
            signer_address: SettlementAddress::new("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
                .unwrap(),
            chain_id: 31337,
            from_user_id: UserId::new(2001).unwrap(),
            to_user_id: UserId::new(3001).unwrap(),
            amount: 100,
            sender_address: SettlementAddress::new("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
                .unwrap(),
            receiver_address: SettlementAddress::new("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
                .unwrap(),
            block_number: 42,
            gas_used: 350_000,
            memo: "{}".to_string(),
            nullifier: FieldElement::from_u64(7),
        }
    }

    fn fast_config() -> EventConfig {
        EventConfig::new().with_retry(3, Duration::from_millis(1))
    }

    #[test]
    fn event_has_twelve_fields() {
        let json = serde_json::to_value(sample_event("0x01")).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn delivers_queued_events() {
        let sink = Arc::new(RecordingSink::new());
        let (publisher, handle) = EventPublisher::spawn(sink.clone(), &fast_config());
        assert_eq!(publisher.publish(sample_event("0x01")), AuditStatus::Queued);
        assert_eq!(publisher.publish(sample_event("0x02")), AuditStatus::Queued);
        drop(publisher);
        handle.await.unwrap();
        let delivered: Vec<_> = sink.events().into_iter().map(|e| e.transaction_hash).collect();
        assert_eq!(delivered, vec!["0x01", "0x02"]);
    }

    #[tokio::test]
    async fn retries_until_delivered() {
        let sink = Arc::new(RecordingSink::failing_first(2));
        let (publisher, handle) = EventPublisher::spawn(sink.clone(), &fast_config());
        publisher.publish(sample_event("0x01"));
        drop(publisher);
        handle.await.unwrap();
        assert_eq!(sink.attempts(), 3);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_event_is_dead_lettered_and_replayable() {
        let sink = Arc::new(RecordingSink::failing_first(3));
        let (publisher, handle) = EventPublisher::spawn(sink.clone(), &fast_config());
        let dead_letters = publisher.dead_letters().clone();
        publisher.publish(sample_event("0x01"));
        drop(publisher);
        handle.await.unwrap();
        assert_eq!(sink.attempts(), 3);
        assert!(sink.events().is_empty());

        let backlog = dead_letters.list();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].attempts, 3);
        assert!(backlog[0].reason.contains("injected failure"));

        let report = dead_letters.replay(sink.as_ref()).await;
        assert_eq!(report.delivered, vec!["0x01"]);
        assert!(dead_letters.is_empty());
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn failed_replay_keeps_the_entry() {
        let dead_letters = DeadLetterQueue::new();
        dead_letters.record(sample_event("0x01"), "queue full".to_string(), 0);
        let sink = RecordingSink::failing_first(1);

        let report = dead_letters.replay(&sink).await;
        assert_eq!(report.failed.len(), 1);
        let backlog = dead_letters.list();
        assert_eq!(backlog[0].attempts, 1);
        assert!(backlog[0].reason.contains("injected failure"));

        dead_letters.replay(&sink).await;
        assert!(dead_letters.is_empty());
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn backlog_survives_a_json_round_trip() {
        let dead_letters = DeadLetterQueue::new();
        dead_letters.record(sample_event("0x01"), "queue full".to_string(), 0);
        let saved = serde_json::to_string(&dead_letters.list()).unwrap();
        let restored = DeadLetterQueue::restore(serde_json::from_str(&saved).unwrap());
        assert_eq!(restored.list(), dead_letters.list());
    }

    #[tokio::test]
    async fn full_queue_does_not_block() {
        struct Stuck;
        #[async_trait]
        impl EventSink for Stuck {
            async fn deliver(&self, _: &AuditEvent) -> Result<(), EventError> {
                std::future::pending().await
            }
        }
        let config = EventConfig::new().with_queue_capacity(1);
        let (publisher, handle) = EventPublisher::spawn(Arc::new(Stuck), &config);
        let accepted = (0..10)
            .filter(|i| {
                publisher.publish(sample_event(&format!("0x{i:02x}"))) == AuditStatus::Queued
            })
            .count();
        assert!(accepted < 10);
        handle.abort();

        // Every refused event is recoverable from the backlog.
        let dead_letters = publisher.dead_letters();
        assert_eq!(dead_letters.len(), 10 - accepted);
        let sink = RecordingSink::new();
        let report = dead_letters.replay(&sink).await;
        assert_eq!(report.delivered.len(), 10 - accepted);
        assert!(dead_letters.is_empty());
    }
}
