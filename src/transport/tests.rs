use serde::Deserialize;
use serde_json::json;

use super::discovery::{DISCOVERY_ADDRESS, DiscoveryMessage};
use super::message::{Acknowledger, Message};
use crate::participant::{Definition, Port};

#[test]
fn test_discovery_envelope() {
    let def = Definition::new("p1", "worker", "Worker")
        .inport(Port::new("in", "q1"))
        .outport(Port::new("out", "q2"));

    let envelope = DiscoveryMessage::new(&def);
    assert_eq!(DISCOVERY_ADDRESS, "fbp");
    assert_eq!(
        envelope.to_json(),
        json!({
            "protocol": "discovery",
            "command": "participant",
            "payload": def.to_json(),
        })
    );

    let bytes = envelope.to_bytes().unwrap();
    let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(decoded, envelope.to_json());
}

#[test]
fn test_message_exposes_raw_and_json() {
    let payload = br#"{"x": 1, "y": [true, null]}"#;
    let message = Message::mqtt(payload, 7);

    assert_eq!(message.data(), payload);
    assert_eq!(message.len(), payload.len());
    assert!(!message.is_empty());
    assert_eq!(message.json().unwrap(), json!({"x": 1, "y": [true, null]}));
    // parsed again on every call
    assert_eq!(message.json().unwrap(), message.json().unwrap());
    assert!(matches!(message.acknowledger(), Acknowledger::Mqtt { packet_id: 7 }));
}

#[test]
fn test_message_parse_typed() {
    #[derive(Deserialize)]
    struct Reading {
        x: i64,
    }

    let message = Message::mqtt(br#"{"x": 42}"#, 0);
    let reading: Reading = message.parse().unwrap();
    assert_eq!(reading.x, 42);
}

#[test]
fn test_malformed_payload_fails_only_on_access() {
    let message = Message::mqtt(b"not json", 0);
    assert_eq!(message.data(), b"not json");
    assert!(message.json().is_err());
}

#[tokio::test]
async fn test_mqtt_message_ack_and_nack_are_noops() {
    let mut message = Message::mqtt(b"{}", 0);
    assert!(!message.supports_ack());
    assert!(!message.is_settled());

    message.ack().await.unwrap();
    assert!(message.is_settled());

    let mut message = Message::mqtt(b"{}", 0);
    message.nack().await.unwrap();
    assert!(message.is_settled());
}
