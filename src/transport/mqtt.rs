//! MQTT v5 reply publisher

use super::message::OutboundMessage;
use super::traits::ReplyPublisher;
use anyhow::Result;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::AsyncClient;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Publishes replies through a shared broker client
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    /// Highest topic alias the broker accepted on the last CONNACK
    topic_alias_max: Arc<AtomicU16>,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, topic_alias_max: Arc<AtomicU16>) -> Self {
        Self {
            client,
            topic_alias_max,
        }
    }
}

#[async_trait]
impl ReplyPublisher for MqttPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        let alias_max = self.topic_alias_max.load(Ordering::Relaxed);
        let properties = message.properties.to_publish_properties(alias_max);
        self.client
            .publish_with_properties(message.topic, QoS::AtLeastOnce, false, message.payload, properties)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MQTT"
    }
}
