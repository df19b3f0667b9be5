#![allow(dead_code)]

use amqp_producer::amqp::{FabricSetup, Message, Transport};
use amqp_producer::{Error, Result, SchemaValidator, ValidationOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A message captured by [`RecordingTransport`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: Message,
    pub exchange: String,
    pub routing_key: String,
}

/// Transport that records every send instead of talking to a broker.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> SentMessage {
        self.sent().pop().expect("no message was sent")
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &Message, exchange: &str, routing_key: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection reset by peer".to_string()));
        }

        self.sent.lock().unwrap().push(SentMessage {
            message: message.clone(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        });
        Ok(())
    }
}

/// Fabric that counts declarations.
#[derive(Clone, Default)]
pub struct CountingFabric {
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl CountingFabric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let fabric = Self::default();
        fabric.fail.store(true, Ordering::SeqCst);
        fabric
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FabricSetup for CountingFabric {
    async fn declare(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Transport("exchange declare refused".to_string()));
        }
        Ok(())
    }
}

/// Validator with a fixed content type and a canned outcome.
pub struct StubValidator {
    content_type: String,
    outcome: ValidationOutcome,
}

impl StubValidator {
    pub fn accepting(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            outcome: Ok(()),
        }
    }

    pub fn rejecting(content_type: &str, reason: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            outcome: Err(reason.to_string()),
        }
    }
}

impl SchemaValidator for StubValidator {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn validate(&self, _body: &[u8]) -> ValidationOutcome {
        self.outcome.clone()
    }
}
