//! `Repeat` component: forwards every message received on `in` to `out`
//! unchanged. Handy as a smoke test for a broker setup.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::participant::definition::{Definition, Port};
use crate::participant::participant::{Participant, Process};
use crate::transport::Message;

pub const COMPONENT: &str = "Repeat";

#[derive(Debug, Default)]
pub struct Repeat;

impl Repeat {
    /// Definition with `in`/`out` ports on the conventional role addresses.
    pub fn definition(id: &str, role: &str) -> Arc<Definition> {
        Arc::new(
            Definition::new(id, role, COMPONENT)
                .with_label("Repeats input on outport unchanged")
                .with_icon("file-word-o")
                .inport(Port::for_role(role, "in").with_datatype("any"))
                .outport(Port::for_role(role, "out").with_datatype("any")),
        )
    }
}

#[async_trait]
impl Process for Repeat {
    async fn process(
        &self,
        participant: &Participant,
        port: &str,
        message: &mut Message<'_>,
    ) -> anyhow::Result<()> {
        let payload = message.json().context("repeat expects a json payload")?;
        debug!("repeat: {} -> out", port);
        participant.send("out", &payload).await?;
        message.ack().await?;
        Ok(())
    }
}
