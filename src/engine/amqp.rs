//! AMQP engine
//!
//! - every inport is a durable queue named after `port.queue`, consumed
//!   with a prefetch of one unacknowledged delivery per channel
//! - every outport is a fanout exchange named after `port.queue`; sends use
//!   an empty routing key
//! - the discovery announcement goes to the `fbp` queue through the
//!   default exchange
//!
//! Deliveries are settled after `process` returns unless the callback
//! already settled them: `Ok` acks, `Err` nacks without requeue.
//!
//! There is no reconnect. A connection error flips `connected()` to false
//! and the owning process decides what to do. A failed `start()` leaves no
//! consumers or connection behind and can be retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::Transport;
use crate::participant::{Participant, Port};
use crate::transport::{DISCOVERY_ADDRESS, DiscoveryMessage, Message, Publisher};
use crate::utils::EngineError;

#[async_trait]
impl Publisher for Channel {
    async fn publish(&self, exchange: &str, payload: Vec<u8>) -> Result<(), EngineError> {
        self.basic_publish(
            exchange,
            "",
            BasicPublishOptions::default(),
            &payload,
            BasicProperties::default(),
        )
        .await?
        .await?;
        Ok(())
    }
}

/// What happens to a delivery once `process` has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Ack,
    Nack,
    /// The callback already acked or nacked.
    Leave,
}

impl Settlement {
    pub(crate) fn after(already_settled: bool, outcome: &anyhow::Result<()>) -> Self {
        match (already_settled, outcome) {
            (true, _) => Self::Leave,
            (false, Ok(())) => Self::Ack,
            (false, Err(_)) => Self::Nack,
        }
    }
}

pub struct AmqpEngine {
    url: String,
    participant: Arc<Participant>,
    debug_output: bool,
    connected: Arc<AtomicBool>,
    connection: Mutex<Option<Connection>>,
    publisher: OnceLock<Arc<dyn Publisher>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl AmqpEngine {
    /// Unacknowledged deliveries allowed in flight on the channel.
    pub const PREFETCH: u16 = 1;

    pub fn new(participant: Arc<Participant>, url: &str, debug_output: bool) -> Self {
        Self {
            url: url.to_string(),
            participant,
            debug_output,
            connected: Arc::new(AtomicBool::new(false)),
            connection: Mutex::new(None),
            publisher: OnceLock::new(),
            consumers: Mutex::new(Vec::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn participant(&self) -> &Arc<Participant> {
        &self.participant
    }

    /// Routes sends through `publisher` instead of a broker channel.
    pub(crate) fn attach_publisher(&self, publisher: Arc<dyn Publisher>) -> bool {
        self.publisher.set(publisher).is_ok()
    }

    async fn setup_inport(&self, channel: &Channel, port: &Port) -> Result<(), EngineError> {
        channel
            .queue_declare(
                &port.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let consumer_tag = format!("{}.{}", self.participant.definition().id, port.id);
        let consumer = channel
            .basic_consume(
                &port.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!("consuming inport {} from queue {}", port.id, port.queue);
        let handle = tokio::spawn(consume(
            consumer,
            self.participant.clone(),
            port.id.clone(),
            self.debug_output,
        ));
        self.track_consumer(handle);
        Ok(())
    }

    pub(crate) fn track_consumer(&self, handle: JoinHandle<()>) {
        if let Ok(mut consumers) = self.consumers.lock() {
            consumers.push(handle);
        }
    }

    fn abort_consumers(&self) {
        if let Ok(mut consumers) = self.consumers.lock() {
            for handle in consumers.drain(..) {
                handle.abort();
            }
        }
    }

    /// Undoes a partial `start`.
    pub(crate) async fn rollback(&self, connection: Option<Connection>) {
        self.abort_consumers();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(connection) = connection {
            if let Err(err) = connection.close(200, "Goodbye").await {
                debug!("closing amqp connection after failed start: {err}");
            }
        }
    }

    async fn setup(&self, connection: &Connection) -> Result<Channel, EngineError> {
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(Self::PREFETCH, BasicQosOptions::default())
            .await?;

        let definition = self.participant.definition();
        for port in &definition.inports {
            self.setup_inport(&channel, port).await?;
        }
        for port in &definition.outports {
            self.setup_outport(&channel, port).await?;
        }

        self.announce(&channel).await?;
        Ok(channel)
    }

    async fn setup_outport(&self, channel: &Channel, port: &Port) -> Result<(), EngineError> {
        channel
            .exchange_declare(
                &port.queue,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;
        debug!("declared fanout exchange {} for outport {}", port.queue, port.id);
        Ok(())
    }

    async fn announce(&self, channel: &Channel) -> Result<(), EngineError> {
        let announcement = DiscoveryMessage::new(self.participant.definition()).to_bytes()?;
        channel
            .basic_publish(
                "",
                DISCOVERY_ADDRESS,
                BasicPublishOptions::default(),
                &announcement,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for AmqpEngine {
    async fn start(&self) -> Result<(), EngineError> {
        if self.publisher.get().is_some() {
            debug!("amqp engine already started");
            return Ok(());
        }

        info!("Connecting to amqp broker as {}", self.participant.definition().id);
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;

        let connected = self.connected.clone();
        connection.on_error(move |err| {
            connected.store(false, Ordering::SeqCst);
            warn!("amqp connection error: {err}");
        });

        let channel = match self.setup(&connection).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!("amqp setup failed: {err}");
                self.rollback(Some(connection)).await;
                return Err(err);
            }
        };

        self.attach_publisher(Arc::new(channel));
        if let Ok(mut slot) = self.connection.lock() {
            *slot = Some(connection);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, port: &str, payload: &Value) -> Result<(), EngineError> {
        let exchange = self
            .participant
            .definition()
            .outport_queue(port)
            .ok_or_else(|| EngineError::port_resolution(port))?;
        let publisher = self.publisher.get().ok_or(EngineError::NotConnected)?;

        let data = serde_json::to_vec(payload)?;
        if self.debug_output {
            info!("Sending on {exchange}: {payload}");
        }
        publisher.publish(exchange, data).await
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.abort_consumers();

        let connection = self.connection.lock().ok().and_then(|mut slot| slot.take());
        self.connected.store(false, Ordering::SeqCst);
        if let Some(connection) = connection {
            connection.close(200, "Goodbye").await?;
        }
        Ok(())
    }
}

pub(crate) async fn consume<S>(
    mut deliveries: S,
    participant: Arc<Participant>,
    port: String,
    debug_output: bool,
) where
    S: Stream<Item = lapin::Result<Delivery>> + Unpin,
{
    while let Some(delivery) = deliveries.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!("amqp consumer for {port} failed: {err}");
                break;
            }
        };

        if debug_output {
            info!("Received on {port}: {}", String::from_utf8_lossy(&delivery.data));
        }

        dispatch(
            &participant,
            &port,
            &delivery.data,
            delivery.delivery_tag,
            delivery.acker,
        )
        .await;
    }
    debug!("amqp consumer for {port} stopped");
}

/// Runs `process` for one delivery and settles it unless the callback did.
pub(crate) async fn dispatch(
    participant: &Participant,
    port: &str,
    data: &[u8],
    delivery_tag: u64,
    acker: Acker,
) -> Settlement {
    let mut message = Message::amqp(data, delivery_tag, acker);
    let outcome = participant.process(port, &mut message).await;
    if let Err(err) = &outcome {
        warn!("process failed on port {port}: {err:#}");
    }

    let settlement = Settlement::after(message.is_settled(), &outcome);
    let settled = match settlement {
        Settlement::Ack => message.ack().await,
        Settlement::Nack => message.nack().await,
        Settlement::Leave => Ok(()),
    };
    if let Err(err) = settled {
        warn!("could not settle delivery on {port}: {err}");
    }
    settlement
}

impl std::fmt::Debug for AmqpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpEngine")
            .field("url", &self.url)
            .field("participant", &self.participant.definition().id)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}
