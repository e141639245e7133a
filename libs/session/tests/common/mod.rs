//! Shared fixtures for session pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use feed_config::FeedConfig;
use feed_recovery::{
    CommunicationError, MessageObserver, Producer, ProducerDescriptor, ProducerManager,
    RecoveryRequestIssuer,
};
use feed_session::{MessageReceiver, ReceiverEvent, Result, SessionError};
use feed_types::{FeedMessage, MessageInterest, MessageKind, ProducerScope, Urn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const START: i64 = 1_700_000_000_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

pub fn descriptor(id: u32, scopes: Vec<ProducerScope>) -> ProducerDescriptor {
    ProducerDescriptor {
        id,
        name: format!("P{}", id),
        description: format!("Producer {}", id),
        api_url: format!("https://api.example.com/p{}/", id),
        active: true,
        scopes,
        stateful_recovery_window_minutes: None,
    }
}

/// Live producer 1 and prematch producer 3, unlocked
pub fn producers(config: &FeedConfig) -> Arc<ProducerManager> {
    Arc::new(ProducerManager::from_descriptors(
        vec![
            descriptor(1, vec![ProducerScope::Live]),
            descriptor(3, vec![ProducerScope::Prematch]),
        ],
        config,
    ))
}

pub fn single_producer() -> Arc<ProducerManager> {
    let timing = Default::default();
    Arc::new(ProducerManager::new(
        [Producer::new(descriptor(1, vec![ProducerScope::Live]), timing)],
        timing,
    ))
}

pub fn odds_change(producer_id: u32, event_id: &str) -> FeedMessage {
    FeedMessage::new(MessageKind::OddsChange, producer_id, START)
        .with_event(event_id, Some(Urn::sport(1)))
}

pub fn message_event(message: FeedMessage) -> ReceiverEvent {
    let raw = format!(
        r#"<{} product="{}" event_id="{}"/>"#,
        message.kind,
        message.producer_id,
        message.event_id.clone().unwrap_or_default()
    );
    ReceiverEvent::Message {
        message,
        raw: Bytes::from(raw),
    }
}

/// Receiver backed by an mpsc channel the test writes into
#[derive(Default)]
pub struct ChannelReceiver {
    sender: Mutex<Option<mpsc::Sender<ReceiverEvent>>>,
    bindings: Mutex<Vec<(MessageInterest, Vec<String>)>>,
    fail_open: AtomicBool,
    closes: Mutex<usize>,
}

impl ChannelReceiver {
    pub fn failing() -> Self {
        let receiver = Self::default();
        receiver.fail_open.store(true, Ordering::SeqCst);
        receiver
    }

    pub async fn send(&self, event: ReceiverEvent) {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => sender.send(event).await.unwrap(),
            None => panic!("receiver is not open"),
        }
    }

    /// Drop the sending side without the session asking for it
    pub fn disconnect(&self) {
        self.sender.lock().take();
    }

    pub fn bindings(&self) -> Vec<(MessageInterest, Vec<String>)> {
        self.bindings.lock().clone()
    }

    pub fn closes(&self) -> usize {
        *self.closes.lock()
    }
}

#[async_trait]
impl MessageReceiver for ChannelReceiver {
    async fn open(
        &self,
        interest: &MessageInterest,
        routing_keys: Vec<String>,
    ) -> Result<mpsc::Receiver<ReceiverEvent>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SessionError::Receiver("broker unreachable".to_string()));
        }
        let (sender, receiver) = mpsc::channel(64);
        *self.sender.lock() = Some(sender);
        self.bindings.lock().push((interest.clone(), routing_keys));
        Ok(receiver)
    }

    async fn close(&self) -> Result<()> {
        self.sender.lock().take();
        *self.closes.lock() += 1;
        Ok(())
    }
}

/// Issuer handing out increasing request ids
#[derive(Debug, Default)]
pub struct RecordingIssuer {
    next_id: AtomicI64,
    issued: Mutex<Vec<u32>>,
}

impl RecordingIssuer {
    pub fn issued(&self) -> Vec<u32> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl RecoveryRequestIssuer for RecordingIssuer {
    async fn request_full_odds_recovery(
        &self,
        producer: &Producer,
        _node_id: Option<i32>,
    ) -> std::result::Result<i64, CommunicationError> {
        self.issued.lock().push(producer.id());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn request_recovery_after_timestamp(
        &self,
        producer: &Producer,
        _after: DateTime<Utc>,
        _node_id: Option<i32>,
    ) -> std::result::Result<i64, CommunicationError> {
        self.issued.lock().push(producer.id());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Observer recording what reached the recovery layer
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub messages: Mutex<Vec<(MessageInterest, MessageKind, u32)>>,
    pub connection_down: Mutex<Vec<DateTime<Utc>>>,
}

#[async_trait]
impl MessageObserver for RecordingObserver {
    async fn on_message(&self, interest: &MessageInterest, message: &FeedMessage) {
        self.messages
            .lock()
            .push((interest.clone(), message.kind, message.producer_id));
    }

    async fn on_connection_down(&self, at: DateTime<Utc>) {
        self.connection_down.lock().push(at);
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Give the worker a chance to process anything still queued
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
