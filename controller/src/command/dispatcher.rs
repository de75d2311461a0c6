//! Command dispatcher for sending commands to devices

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{Publish, PublishProperties};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::AsyncClient;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tinykube_shared::{now_ms, protocol, topic, Verb};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Tracks a sent command awaiting its reply
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub token: u64,
    pub device_id: String,
    pub verb: Verb,
    pub sent_at: u64,
    pub timeout_ms: u64,
}

impl PendingCommand {
    /// Check if this command has timed out (no reply received)
    pub fn is_timed_out(&self) -> bool {
        now_ms() > self.sent_at + self.timeout_ms
    }
}

/// A command ready to be published
#[derive(Debug, Clone)]
pub struct OutgoingCommand {
    pub token: u64,
    pub topic: String,
    pub response_topic: String,
    pub payload: Bytes,
}

impl OutgoingCommand {
    /// Correlation data on the wire: the token as 8 big-endian bytes
    pub fn correlation_data(&self) -> Bytes {
        Bytes::copy_from_slice(&self.token.to_be_bytes())
    }
}

/// A reply matched to the command it answers
#[derive(Debug, Clone)]
pub struct CompletedCommand {
    pub command: PendingCommand,
    pub payload: Bytes,
    pub round_trip_ms: u64,
}

/// Sends commands and matches replies by correlation token
pub struct CommandDispatcher {
    client: AsyncClient,
    namespace: String,
    client_id: String,
    timeout_ms: u64,
    next_token: AtomicU64,
    /// Pending commands by correlation token
    pending: Arc<RwLock<HashMap<u64, PendingCommand>>>,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(client: AsyncClient, namespace: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            client_id: client_id.into(),
            timeout_ms: protocol::COMMAND_REPLY_TIMEOUT_MS,
            next_token: AtomicU64::new(0),
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Override how long a reply is awaited before the command is reported overdue
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Filter covering every reply addressed to this client for `device_id`
    pub fn reply_filter(&self, device_id: &str) -> String {
        format!(
            "{}/{}/{}/+/__for_{}",
            self.namespace,
            device_id,
            topic::COMMAND_SEGMENT,
            self.client_id
        )
    }

    /// Allocate a token, register the command as pending and address it
    pub async fn prepare(&self, device_id: &str, verb: Verb, payload: Bytes) -> OutgoingCommand {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;

        let pending = PendingCommand {
            token,
            device_id: device_id.to_string(),
            verb,
            sent_at: now_ms(),
            timeout_ms: self.timeout_ms,
        };
        self.pending.write().await.insert(token, pending);

        OutgoingCommand {
            token,
            topic: topic::command_topic(&self.namespace, device_id, verb),
            response_topic: topic::reply_topic(&self.namespace, device_id, verb, &self.client_id),
            payload,
        }
    }

    /// Send a command to a specific device, returning its correlation token
    pub async fn send_command(&self, device_id: &str, verb: Verb, payload: Bytes) -> anyhow::Result<u64> {
        let command = self.prepare(device_id, verb, payload).await;
        let properties = PublishProperties {
            response_topic: Some(command.response_topic.clone()),
            correlation_data: Some(command.correlation_data()),
            content_type: Some(protocol::CONTENT_TYPE.to_string()),
            ..Default::default()
        };

        if let Err(e) = self
            .client
            .publish_with_properties(command.topic.clone(), QoS::AtLeastOnce, false, command.payload, properties)
            .await
        {
            self.pending.write().await.remove(&command.token);
            return Err(e.into());
        }

        info!(">>> Sent {} to {} (token={})", verb, device_id, command.token);
        Ok(command.token)
    }

    /// Match a reply against the pending commands.
    ///
    /// Replies without correlation data, with a malformed token, or for a
    /// command no longer pending are logged and ignored.
    pub async fn handle_reply(&self, topic: &str, correlation_data: Option<&[u8]>, payload: Bytes) -> Option<CompletedCommand> {
        let Some(data) = correlation_data else {
            warn!("<<< Reply on {} without correlation data", topic);
            return None;
        };
        let Ok(bytes) = <[u8; 8]>::try_from(data) else {
            warn!("<<< Reply on {} with a {}-byte token", topic, data.len());
            return None;
        };
        let token = u64::from_be_bytes(bytes);

        match self.pending.write().await.remove(&token) {
            Some(command) => {
                let round_trip_ms = now_ms().saturating_sub(command.sent_at);
                debug!("<<< Reply for {} (token={}) in {}ms", command.verb, token, round_trip_ms);
                Some(CompletedCommand {
                    command,
                    payload,
                    round_trip_ms,
                })
            }
            None => {
                warn!("<<< Reply for unknown command token={}", token);
                None
            }
        }
    }

    /// Match a reply packet from the broker
    pub async fn handle_publish(&self, publish: &Publish) -> Option<CompletedCommand> {
        let topic = String::from_utf8_lossy(&publish.topic);
        let correlation = publish
            .properties
            .as_ref()
            .and_then(|p| p.correlation_data.as_deref());
        self.handle_reply(&topic, correlation, publish.payload.clone()).await
    }

    /// Remove overdue commands from tracking, returning them
    pub async fn cleanup_timed_out(&self) -> Vec<PendingCommand> {
        let mut pending = self.pending.write().await;
        let overdue: Vec<u64> = pending
            .values()
            .filter(|c| c.is_timed_out())
            .map(|c| c.token)
            .collect();
        overdue.iter().filter_map(|token| pending.remove(token)).collect()
    }

    /// Get pending command count
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}
