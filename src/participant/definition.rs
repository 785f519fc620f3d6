use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::utils::ConfigurationError;

/// A named input or output of a participant, bound to a broker address.
///
/// `queue` is the broker-native address: a queue/exchange name on AMQP, a
/// topic on MQTT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub queue: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl Port {
    pub fn new(id: &str, queue: &str) -> Self {
        Self {
            id: id.to_string(),
            queue: queue.to_string(),
            datatype: None,
        }
    }

    /// Port using the conventional `<role>.<ID>` address.
    pub fn for_role(role: &str, id: &str) -> Self {
        Self::new(id, &format!("{role}.{}", id.to_uppercase()))
    }

    pub fn with_datatype(mut self, datatype: &str) -> Self {
        self.datatype = Some(datatype.to_string());
        self
    }
}

/// Static description of one participant.
///
/// Serialized as-is into the discovery payload, so field names follow the
/// JSON that FBP tooling expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub id: String,
    pub role: String,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub inports: Vec<Port>,
    #[serde(default)]
    pub outports: Vec<Port>,
}

impl Definition {
    pub fn new(id: &str, role: &str, component: &str) -> Self {
        Self {
            id: id.to_string(),
            role: role.to_string(),
            component: component.to_string(),
            label: None,
            icon: None,
            inports: Vec::new(),
            outports: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }

    pub fn inport(mut self, port: Port) -> Self {
        self.inports.push(port);
        self
    }

    pub fn outport(mut self, port: Port) -> Self {
        self.outports.push(port);
        self
    }

    /// Checks that port ids are unique within the inport list and within
    /// the outport list. The same id may appear once on each side.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_unique("inport", &self.inports)?;
        check_unique("outport", &self.outports)
    }

    /// Broker address of the port named `id`, if declared.
    pub fn queue_for_port<'a>(ports: &'a [Port], id: &str) -> Option<&'a str> {
        ports
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.queue.as_str())
    }

    pub fn outport_queue(&self, id: &str) -> Option<&str> {
        Self::queue_for_port(&self.outports, id)
    }

    /// Every inport bound to `address`. Several ports may share one.
    pub fn inports_on<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a Port> + 'a {
        self.inports.iter().filter(move |p| p.queue == address)
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Only strings and vectors of strings: serialization cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn check_unique(direction: &'static str, ports: &[Port]) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port.id.as_str()) {
            return Err(ConfigurationError::DuplicatePort {
                direction,
                id: port.id.clone(),
            });
        }
    }
    Ok(())
}
