//! Connection manager with a persistent broker session and automatic reconnection

use crate::transport::{InboundMessage, MqttPublisher};
use anyhow::Result;
use rumqttc::v5::mqttbytes::v5::{Packet, SubscribeReasonCode};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tinykube_shared::codec::MAX_PAYLOAD_SIZE;
use tinykube_shared::settings::MqttSettings;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bound on in-flight requests between the client handle and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Headroom above the largest payload for topic and properties
const PACKET_OVERHEAD: usize = 64 * 1024;

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Session established and command subscription requested
    Connected,
    /// The broker granted the command subscription
    Subscribed,
    /// The command subscription could not be requested or was refused
    SubscribeFailed { reason: String },
    /// An established session was lost; reconnection follows
    Disconnected { reason: String },
    /// No session could be established yet
    ConnectionFailed { reason: String },
    /// A command arrived
    Received(InboundMessage),
}

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub settings: MqttSettings,
    /// Topic filter subscribed on every (re)connect
    pub subscription: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
}

impl ConnectionConfig {
    fn mqtt_options(&self) -> MqttOptions {
        let settings = &self.settings;
        let mut options = MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        options.set_clean_start(settings.clean_session);
        options.set_max_packet_size(Some((MAX_PAYLOAD_SIZE + PACKET_OVERHEAD) as u32));
        if let Some(username) = &settings.username {
            options.set_credentials(username.clone(), settings.password.clone().unwrap_or_default());
        }
        options
    }
}

/// Owns the broker session. Commands arrive as [`ConnectionEvent::Received`];
/// replies go out through [`ConnectionManager::publisher`].
pub struct ConnectionManager {
    client: AsyncClient,
    topic_alias_max: Arc<AtomicU16>,
    event_rx: mpsc::Receiver<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a new connection manager and start the connection loop
    pub fn new(config: ConnectionConfig) -> Self {
        let (client, eventloop) = AsyncClient::new(config.mqtt_options(), REQUEST_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);
        let topic_alias_max = Arc::new(AtomicU16::new(0));

        let loop_client = client.clone();
        let loop_alias_max = topic_alias_max.clone();
        tokio::spawn(async move {
            connection_loop(config, eventloop, loop_client, loop_alias_max, event_tx).await;
        });

        Self {
            client,
            topic_alias_max,
            event_rx,
        }
    }

    /// Publisher for replies on this session
    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher::new(self.client.clone(), self.topic_alias_max.clone())
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Close the session
    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// A SUBACK grants the subscription only if every filter got a success code
fn check_suback(codes: &[SubscribeReasonCode]) -> Result<(), String> {
    if codes.is_empty() {
        return Err("empty SUBACK".to_string());
    }
    match codes.iter().find(|code| !matches!(code, SubscribeReasonCode::Success(_))) {
        Some(code) => Err(format!("{:?}", code)),
        None => Ok(()),
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: ConnectionConfig,
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic_alias_max: Arc<AtomicU16>,
    event_tx: mpsc::Sender<ConnectionEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;
    let mut connected = false;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(packet)) => packet,
            Ok(Event::Outgoing(_)) => continue,
            Err(ConnectionError::RequestsDone) => {
                debug!("Client handle dropped, stopping connection loop");
                return;
            }
            Err(e) => {
                let reason = e.to_string();
                let event = if connected {
                    ConnectionEvent::Disconnected { reason }
                } else {
                    ConnectionEvent::ConnectionFailed { reason }
                };
                connected = false;
                if event_tx.send(event).await.is_err() {
                    return;
                }

                // Wait before reconnecting, with exponential backoff
                tokio::time::sleep(reconnect_delay).await;
                reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
                continue;
            }
        };

        match event {
            Packet::ConnAck(ack) => {
                connected = true;
                reconnect_delay = config.reconnect_delay;

                let alias_max = ack
                    .properties
                    .as_ref()
                    .and_then(|p| p.topic_alias_max)
                    .unwrap_or(0);
                topic_alias_max.store(alias_max, Ordering::Relaxed);
                debug!("Broker accepts topic aliases up to {}", alias_max);

                if event_tx.send(ConnectionEvent::Connected).await.is_err() {
                    return;
                }

                // The event loop must keep polling, so the request is queued without waiting
                if let Err(e) = client.try_subscribe(config.subscription.clone(), QoS::AtLeastOnce) {
                    warn!("Failed to request subscription to {}: {}", config.subscription, e);
                    let reason = format!("subscribe request for {} not queued: {}", config.subscription, e);
                    if event_tx.send(ConnectionEvent::SubscribeFailed { reason }).await.is_err() {
                        return;
                    }
                }
            }
            Packet::SubAck(ack) => {
                debug!("Subscription acknowledged: {:?}", ack.return_codes);
                let event = match check_suback(&ack.return_codes) {
                    Ok(()) => ConnectionEvent::Subscribed,
                    Err(reason) => ConnectionEvent::SubscribeFailed {
                        reason: format!("{} refused: {}", config.subscription, reason),
                    },
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            Packet::Publish(publish) => {
                let message = InboundMessage::from_publish(&publish);
                if event_tx.send(ConnectionEvent::Received(message)).await.is_err() {
                    return;
                }
            }
            Packet::Disconnect(disconnect) => {
                warn!("Broker sent disconnect: {:?}", disconnect.reason_code);
            }
            _ => {}
        }
    }
}
