//! Inbound message as handed to a participant's `Process` callback.
//!
//! `Message` borrows the payload from the transport's delivery, so it only
//! lives for the duration of one callback. The structured form is parsed on
//! every `json()` call and never cached.
//!
//! Acknowledgement is a per-transport capability:
//! - AMQP deliveries carry an acker bound to their delivery tag; `ack` and
//!   `nack` settle it on the channel.
//! - MQTT messages arrive at QoS 0 where the broker expects no
//!   acknowledgement; `ack` and `nack` succeed without doing anything.

use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::utils::EngineError;

#[derive(Debug)]
pub enum Acknowledger {
    Amqp { delivery_tag: u64, acker: Acker },
    Mqtt { packet_id: u16 },
}

#[derive(Debug)]
pub struct Message<'a> {
    data: &'a [u8],
    acknowledger: Acknowledger,
    settled: bool,
}

impl<'a> Message<'a> {
    pub fn amqp(data: &'a [u8], delivery_tag: u64, acker: Acker) -> Self {
        Self {
            data,
            acknowledger: Acknowledger::Amqp {
                delivery_tag,
                acker,
            },
            settled: false,
        }
    }

    pub fn mqtt(data: &'a [u8], packet_id: u16) -> Self {
        Self {
            data,
            acknowledger: Acknowledger::Mqtt { packet_id },
            settled: false,
        }
    }

    /// Raw payload bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parses the payload as JSON. Fails only here, never at delivery.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(self.data)
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(self.data)
    }

    pub fn acknowledger(&self) -> &Acknowledger {
        &self.acknowledger
    }

    /// Whether `ack`/`nack` reach the broker for this message.
    pub fn supports_ack(&self) -> bool {
        matches!(self.acknowledger, Acknowledger::Amqp { .. })
    }

    /// True once `ack` or `nack` has been called.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub async fn ack(&mut self) -> Result<(), EngineError> {
        if self.settled {
            return Ok(());
        }
        if let Acknowledger::Amqp { acker, .. } = &self.acknowledger {
            acker.ack(BasicAckOptions::default()).await?;
        }
        self.settled = true;
        Ok(())
    }

    /// Rejects the message without requeueing it.
    pub async fn nack(&mut self) -> Result<(), EngineError> {
        if self.settled {
            return Ok(());
        }
        if let Acknowledger::Amqp { acker, .. } = &self.acknowledger {
            acker
                .nack(BasicNackOptions {
                    requeue: false,
                    ..BasicNackOptions::default()
                })
                .await?;
        }
        self.settled = true;
        Ok(())
    }
}
