use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::{Engine, Transport};
use crate::participant::definition::Definition;
use crate::transport::Message;
use crate::utils::EngineError;

/// Application logic of a participant.
///
/// Called once per inbound message with the id of the inport it arrived on.
/// Outputs are sent through `participant.send`. The engine does not retry a
/// failed call; see the engine docs for how each transport settles the
/// message afterwards.
#[async_trait]
pub trait Process: Send + Sync {
    async fn process(
        &self,
        participant: &Participant,
        port: &str,
        message: &mut Message<'_>,
    ) -> anyhow::Result<()>;
}

/// A running unit of application logic bound to one engine.
pub struct Participant {
    definition: Arc<Definition>,
    processor: Box<dyn Process>,
    engine: OnceLock<Weak<Engine>>,
}

impl Participant {
    pub fn new(definition: Arc<Definition>, processor: impl Process + 'static) -> Self {
        Self {
            definition,
            processor: Box::new(processor),
            engine: OnceLock::new(),
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Records the engine this participant sends through. Set once.
    pub(crate) fn bind(&self, engine: &Arc<Engine>) -> Result<(), EngineError> {
        self.engine
            .set(Arc::downgrade(engine))
            .map_err(|_| EngineError::AlreadyBound)
    }

    pub fn is_bound(&self) -> bool {
        self.engine.get().is_some()
    }

    /// The bound engine, as long as something else keeps it alive.
    pub fn engine(&self) -> Result<Arc<Engine>, EngineError> {
        self.engine
            .get()
            .and_then(Weak::upgrade)
            .ok_or(EngineError::NotBound)
    }

    pub async fn send(&self, port: &str, payload: &Value) -> Result<(), EngineError> {
        self.engine()?.send(port, payload).await
    }

    pub async fn ack(&self, message: &mut Message<'_>) -> Result<(), EngineError> {
        message.ack().await
    }

    pub async fn nack(&self, message: &mut Message<'_>) -> Result<(), EngineError> {
        message.nack().await
    }

    pub(crate) async fn process(
        &self,
        port: &str,
        message: &mut Message<'_>,
    ) -> anyhow::Result<()> {
        self.processor.process(self, port, message).await
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("definition", &self.definition)
            .field("bound", &self.is_bound())
            .finish()
    }
}
