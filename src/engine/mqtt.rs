//! MQTT engine
//!
//! Ports map straight onto topics: an inport subscribes to `port.queue`,
//! an outport publishes to it. Everything runs at QoS 0, so there is no
//! broker-side acknowledgement and `Message::ack` is a no-op here.
//!
//! rumqttc reconnects on the next `poll` after a failure. Every successful
//! ConnAck re-announces the participant on `fbp` and re-subscribes every
//! inport, since a dropped session may have lost its subscriptions.
//!
//! The event loop task only polls and records connection state. ConnAck
//! setup and inbound dispatch run on a separate dispatcher task, fed in
//! order through an unbounded channel, so the poll loop keeps draining the
//! client request queue while a callback is waiting to publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::Transport;
use crate::engine::address::MqttConfig;
use crate::participant::Participant;
use crate::transport::{DISCOVERY_ADDRESS, DiscoveryMessage, Message, Publisher};
use crate::utils::EngineError;

/// Client side of an MQTT connection as the engine uses it.
#[async_trait]
pub trait MqttLink: Publisher {
    async fn subscribe(&self, topic: &str) -> Result<(), EngineError>;

    async fn disconnect(&self) -> Result<(), EngineError>;
}

#[async_trait]
impl Publisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EngineError> {
        AsyncClient::publish(self, topic, QoS::AtMostOnce, false, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl MqttLink for AsyncClient {
    async fn subscribe(&self, topic: &str) -> Result<(), EngineError> {
        AsyncClient::subscribe(self, topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), EngineError> {
        AsyncClient::disconnect(self).await?;
        Ok(())
    }
}

pub struct MqttEngine {
    shared: Arc<MqttShared>,
    config: MqttConfig,
    eventloop: Mutex<Option<EventLoop>>,
    /// Poll loop first, then the dispatcher.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct MqttShared {
    participant: Arc<Participant>,
    link: Arc<dyn MqttLink>,
    connected: AtomicBool,
    stopping: AtomicBool,
    debug_output: bool,
}

impl MqttEngine {
    /// Queued client requests before `publish`/`subscribe` start waiting
    /// on the event loop.
    pub(crate) const REQUEST_CAPACITY: usize = 64;

    /// Pause between reconnect attempts after a failed poll.
    const RECONNECT_DELAY: Duration = Duration::from_secs(1);

    const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

    /// Largest packet MQTT can encode, in both directions.
    pub const MAX_PACKET_SIZE: usize = 268_435_455;

    pub fn new(participant: Arc<Participant>, config: MqttConfig, debug_output: bool) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(&config), Self::REQUEST_CAPACITY);
        let mut engine = Self::with_link(participant, Arc::new(client), config, debug_output);
        engine.eventloop = Mutex::new(Some(eventloop));
        engine
    }

    /// Engine over an arbitrary link, without an event loop of its own.
    pub(crate) fn with_link(
        participant: Arc<Participant>,
        link: Arc<dyn MqttLink>,
        config: MqttConfig,
        debug_output: bool,
    ) -> Self {
        Self {
            shared: Arc::new(MqttShared {
                participant,
                link,
                connected: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                debug_output,
            }),
            config,
            eventloop: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    pub fn participant(&self) -> &Arc<Participant> {
        &self.shared.participant
    }

    /// What the poll loop does with an event.
    #[cfg(test)]
    pub(crate) fn route_event(&self, event: Event, events: &UnboundedSender<Event>) {
        self.shared.route(event, events);
    }

    /// Routes `event` and runs whatever it hands to the dispatcher.
    #[cfg(test)]
    pub(crate) async fn handle_event(&self, event: Event) {
        let (events, mut inbox) = mpsc::unbounded_channel();
        self.shared.route(event, &events);
        drop(events);
        while let Some(event) = inbox.recv().await {
            self.shared.handle(event).await;
        }
    }
}

#[async_trait]
impl Transport for MqttEngine {
    async fn start(&self) -> Result<(), EngineError> {
        let Some(mut eventloop) = self.eventloop.lock().ok().and_then(|mut el| el.take()) else {
            debug!("mqtt event loop already running");
            return Ok(());
        };

        info!(
            "Connecting to mqtt://{}:{} as {}",
            self.config.host,
            self.config.port,
            self.shared.participant.definition().id
        );

        let (events, inbox) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(self.shared.clone(), inbox));

        let shared = self.shared.clone();
        let poller = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => {
                        let disconnecting = matches!(event, Event::Outgoing(Outgoing::Disconnect));
                        shared.route(event, &events);
                        if disconnecting && shared.stopping.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    Err(err) => {
                        if shared.stopping.load(Ordering::SeqCst) {
                            break;
                        }
                        if shared.connected.swap(false, Ordering::SeqCst) {
                            warn!("mqtt connection lost: {err}");
                        } else {
                            debug!("mqtt connect failed: {err}");
                        }
                        tokio::time::sleep(MqttEngine::RECONNECT_DELAY).await;
                    }
                }
            }
            debug!("mqtt event loop stopped");
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(poller);
            tasks.push(dispatcher);
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, port: &str, payload: &Value) -> Result<(), EngineError> {
        let topic = self
            .shared
            .participant
            .definition()
            .outport_queue(port)
            .ok_or_else(|| EngineError::port_resolution(port))?;

        let data = serde_json::to_vec(payload)?;
        if self.shared.debug_output {
            info!("Sending on {topic}: {payload}");
        }
        self.shared.link.publish(topic, data).await
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.shared.stopping.store(true, Ordering::SeqCst);
        let result = self.shared.link.disconnect().await;
        self.shared.connected.store(false, Ordering::SeqCst);

        let tasks = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for mut handle in tasks {
            if tokio::time::timeout(Self::SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        result
    }
}

async fn dispatch(shared: Arc<MqttShared>, mut inbox: UnboundedReceiver<Event>) {
    while let Some(event) = inbox.recv().await {
        shared.handle(event).await;
    }
    debug!("mqtt dispatcher stopped");
}

impl MqttShared {
    /// Runs on the poll loop. Never waits on the client.
    fn route(&self, event: Event, events: &UnboundedSender<Event>) {
        match &event {
            Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                self.connected.store(true, Ordering::SeqCst);
            }
            Event::Incoming(Packet::ConnAck(ack)) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!("mqtt broker refused connection: {:?}", ack.code);
                return;
            }
            Event::Incoming(Packet::Publish(_)) => {}
            Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect) => {
                self.connected.store(false, Ordering::SeqCst);
                return;
            }
            _ => return,
        }
        if events.send(event).is_err() {
            debug!("mqtt dispatcher gone, dropping event");
        }
    }

    async fn handle(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                if let Err(err) = self.on_connect().await {
                    warn!("mqtt setup after connect failed: {err}");
                }
            }
            Event::Incoming(Packet::Publish(publish)) => self.on_message(&publish).await,
            _ => {}
        }
    }

    async fn on_connect(&self) -> Result<(), EngineError> {
        let definition = self.participant.definition();
        let announcement = DiscoveryMessage::new(definition).to_bytes()?;
        self.link.publish(DISCOVERY_ADDRESS, announcement).await?;

        for port in &definition.inports {
            if self.debug_output {
                info!("Connecting port {} to mqtt topic {}", port.id, port.queue);
            }
            self.link.subscribe(&port.queue).await?;
        }
        Ok(())
    }

    async fn on_message(&self, publish: &Publish) {
        if self.debug_output {
            info!(
                "Received on {}: {}",
                publish.topic,
                String::from_utf8_lossy(&publish.payload)
            );
        }

        let mut delivered = false;
        for port in self.participant.definition().inports_on(&publish.topic) {
            delivered = true;
            let mut message = Message::mqtt(&publish.payload, publish.pkid);
            if let Err(err) = self.participant.process(&port.id, &mut message).await {
                warn!("process failed on port {}: {err:#}", port.id);
            }
        }

        if !delivered {
            debug!("no inport bound to topic {}, dropping message", publish.topic);
        }
    }
}

pub(crate) fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = if config.client_id.is_empty() {
        format!("msgflo-{}", Uuid::new_v4().simple())
    } else {
        config.client_id.clone()
    };

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive.into()));
    options.set_clean_session(config.clean_session);
    options.set_max_packet_size(MqttEngine::MAX_PACKET_SIZE, MqttEngine::MAX_PACKET_SIZE);
    if !config.username.is_empty() {
        options.set_credentials(config.username.clone(), config.password.clone());
    }
    options
}

impl std::fmt::Debug for MqttEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttEngine")
            .field("config", &self.config)
            .field("participant", &self.shared.participant.definition().id)
            .field("connected", &self.shared.connected.load(Ordering::SeqCst))
            .finish()
    }
}
