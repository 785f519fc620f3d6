//! Engines bind a participant to a broker.
//!
//! An engine maps the participant's ports onto broker addresses, announces
//! the participant on the discovery address, turns inbound deliveries into
//! `Process` calls and publishes whatever the participant sends.
//!
//! The set of transports is closed: `Engine` is an enum over the AMQP and
//! MQTT implementations, both exposing the `Transport` capability set. New
//! transports are added to the enum and registered with `EngineFactory`.
//!
//! Lifecycle is two-phase. Building an engine does no I/O; `start()`
//! connects, declares addresses and announces; `shutdown()` tears it down.

pub mod address;
pub mod amqp;
pub mod factory;
pub mod mqtt;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::participant::Participant;
use crate::utils::EngineError;

pub use address::{MqttConfig, TransportKind};
pub use amqp::AmqpEngine;
pub use factory::{BROKER_ENV, EngineFactory, create_engine};
pub use mqtt::MqttEngine;

/// What every engine can do, whatever the broker underneath.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects and sets up the participant's ports.
    async fn start(&self) -> Result<(), EngineError>;

    /// Last known connection state.
    fn connected(&self) -> bool;

    /// Publishes `payload` on the outport named `port`.
    async fn send(&self, port: &str, payload: &Value) -> Result<(), EngineError>;

    async fn shutdown(&self) -> Result<(), EngineError>;
}

#[derive(Debug)]
pub enum Engine {
    Amqp(AmqpEngine),
    Mqtt(MqttEngine),
}

impl Engine {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Amqp(_) => TransportKind::Amqp,
            Self::Mqtt(_) => TransportKind::Mqtt,
        }
    }

    pub fn participant(&self) -> &Arc<Participant> {
        match self {
            Self::Amqp(engine) => engine.participant(),
            Self::Mqtt(engine) => engine.participant(),
        }
    }

    fn transport(&self) -> &dyn Transport {
        match self {
            Self::Amqp(engine) => engine,
            Self::Mqtt(engine) => engine,
        }
    }
}

#[async_trait]
impl Transport for Engine {
    async fn start(&self) -> Result<(), EngineError> {
        self.transport().start().await
    }

    fn connected(&self) -> bool {
        self.transport().connected()
    }

    async fn send(&self, port: &str, payload: &Value) -> Result<(), EngineError> {
        self.transport().send(port, payload).await
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.transport().shutdown().await
    }
}

/// Construction-time configuration for an engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub url: String,
    pub participant: Option<Arc<Participant>>,
    pub debug_output: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn participant(mut self, participant: Arc<Participant>) -> Self {
        self.participant = Some(participant);
        self
    }

    pub fn debug_output(mut self, debug_output: bool) -> Self {
        self.debug_output = debug_output;
        self
    }
}
