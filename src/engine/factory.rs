//! Engine factory
//!
//! Picks a transport from the broker URL's scheme and builds the matching
//! engine through an explicit registration table. The fallback broker URL
//! (normally `MSGFLO_BROKER`) is resolved once, when the factory is made,
//! and never re-read afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::address::{MqttConfig, TransportKind};
use crate::engine::amqp::AmqpEngine;
use crate::engine::mqtt::MqttEngine;
use crate::engine::{Engine, EngineConfig};
use crate::participant::Participant;
use crate::utils::{ConfigurationError, EngineError};

/// Environment variable holding the broker URL used when none is given.
pub const BROKER_ENV: &str = "MSGFLO_BROKER";

/// Builds an engine for a URL of one transport kind.
pub type Constructor = fn(&str, Arc<Participant>, bool) -> Result<Engine, EngineError>;

pub struct EngineFactory {
    fallback_url: String,
    constructors: HashMap<TransportKind, Constructor>,
}

impl EngineFactory {
    /// Factory with the AMQP and MQTT transports registered.
    pub fn new(fallback_url: Option<String>) -> Self {
        let mut factory = Self {
            fallback_url: fallback_url.unwrap_or_default(),
            constructors: HashMap::new(),
        };
        factory
            .register(TransportKind::Amqp, build_amqp)
            .register(TransportKind::Mqtt, build_mqtt);
        factory
    }

    /// Same as `new`, with the fallback read from `MSGFLO_BROKER`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(BROKER_ENV).ok())
    }

    pub fn register(&mut self, kind: TransportKind, constructor: Constructor) -> &mut Self {
        self.constructors.insert(kind, constructor);
        self
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    /// `url` unless it is empty, then the fallback. May still be empty.
    pub fn resolve_url<'a>(&'a self, url: &'a str) -> &'a str {
        if url.is_empty() { &self.fallback_url } else { url }
    }

    /// Builds the engine for `config` and binds its participant to it.
    ///
    /// No connection is opened here; call `start()` on the result.
    pub fn create(&self, config: EngineConfig) -> Result<Arc<Engine>, EngineError> {
        let url = self.resolve_url(&config.url).to_string();

        let participant = config
            .participant
            .ok_or(ConfigurationError::MissingParticipant)?;
        if participant.is_bound() {
            return Err(EngineError::AlreadyBound);
        }
        participant.definition().validate()?;

        let kind = TransportKind::from_url(&url)?;
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| ConfigurationError::UnsupportedScheme(url.clone()))?;

        debug!("creating {kind} engine for {}", participant.definition().id);
        let engine = Arc::new(constructor(&url, participant.clone(), config.debug_output)?);
        participant.bind(&engine)?;
        Ok(engine)
    }
}

impl Default for EngineFactory {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Builds an engine with the fallback URL taken from `MSGFLO_BROKER`.
pub fn create_engine(config: EngineConfig) -> Result<Arc<Engine>, EngineError> {
    EngineFactory::from_env().create(config)
}

fn build_amqp(
    url: &str,
    participant: Arc<Participant>,
    debug_output: bool,
) -> Result<Engine, EngineError> {
    Ok(Engine::Amqp(AmqpEngine::new(participant, url, debug_output)))
}

fn build_mqtt(
    url: &str,
    participant: Arc<Participant>,
    debug_output: bool,
) -> Result<Engine, EngineError> {
    let config = MqttConfig::from_url(url)?;
    if debug_output {
        info!(
            "mqtt host: {} port: {} client_id: {} keep_alive: {} clean_session: {}",
            config.host, config.port, config.client_id, config.keep_alive, config.clean_session
        );
    }
    Ok(Engine::Mqtt(MqttEngine::new(participant, config, debug_output)))
}
