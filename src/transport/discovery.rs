//! Discovery announcement.
//!
//! Every participant publishes this envelope on the well-known `fbp`
//! address so that FBP tooling can learn the live graph:
//!
//! ```json
//! {"protocol": "discovery", "command": "participant", "payload": { ...definition... }}
//! ```

use serde::Serialize;

use crate::participant::Definition;

/// Well-known address (AMQP routing key / MQTT topic) for discovery.
pub const DISCOVERY_ADDRESS: &str = "fbp";

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryMessage<'a> {
    pub protocol: &'static str,
    pub command: &'static str,
    pub payload: &'a Definition,
}

impl<'a> DiscoveryMessage<'a> {
    pub fn new(definition: &'a Definition) -> Self {
        Self {
            protocol: "discovery",
            command: "participant",
            payload: definition,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "protocol": self.protocol,
            "command": self.command,
            "payload": self.payload.to_json(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
