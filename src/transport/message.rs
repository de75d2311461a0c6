//! Transport-neutral message types
//!
//! The dispatcher only sees these; the MQTT client types stay inside the
//! transport and connection modules.

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{Publish, PublishProperties};

/// A command as received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    /// Where the reply must go
    pub response_topic: Option<String>,
    /// Opaque token echoed back in the reply
    pub correlation_data: Option<Bytes>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            response_topic: None,
            correlation_data: None,
        }
    }

    pub fn with_response_topic(mut self, topic: impl Into<String>) -> Self {
        self.response_topic = Some(topic.into());
        self
    }

    pub fn with_correlation_data(mut self, data: impl Into<Bytes>) -> Self {
        self.correlation_data = Some(data.into());
        self
    }

    /// Extract topic, payload and correlation properties from a publish packet
    pub fn from_publish(publish: &Publish) -> Self {
        let properties = publish.properties.as_ref();
        Self {
            topic: String::from_utf8_lossy(&publish.topic).into_owned(),
            payload: publish.payload.clone(),
            response_topic: properties.and_then(|p| p.response_topic.clone()),
            correlation_data: properties.and_then(|p| p.correlation_data.clone()),
        }
    }
}

/// Publish properties attached to a reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub correlation_data: Option<Bytes>,
    pub content_type: Option<String>,
    pub topic_alias: Option<u16>,
    pub user_properties: Vec<(String, String)>,
}

impl MessageProperties {
    /// MQTT v5 publish properties. The alias is dropped when it exceeds what
    /// the broker accepts (`alias_max`).
    pub fn to_publish_properties(&self, alias_max: u16) -> PublishProperties {
        PublishProperties {
            correlation_data: self.correlation_data.clone(),
            content_type: self.content_type.clone(),
            topic_alias: self.topic_alias.filter(|alias| *alias <= alias_max),
            user_properties: self.user_properties.clone(),
            ..Default::default()
        }
    }
}

/// A reply ready to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub properties: MessageProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_dropped_when_broker_disallows_it() {
        let properties = MessageProperties {
            correlation_data: Some(Bytes::from_static(b"\x00\x01")),
            content_type: Some("application/protobuf".into()),
            topic_alias: Some(1),
            user_properties: vec![("Status".into(), "200".into())],
        };

        let allowed = properties.to_publish_properties(10);
        assert_eq!(allowed.topic_alias, Some(1));
        assert_eq!(allowed.correlation_data.as_deref(), Some(&b"\x00\x01"[..]));
        assert_eq!(allowed.content_type.as_deref(), Some("application/protobuf"));

        let refused = properties.to_publish_properties(0);
        assert_eq!(refused.topic_alias, None);
        assert_eq!(refused.user_properties, properties.user_properties);
    }

    #[test]
    fn test_builder() {
        let message = InboundMessage::new("tinykube/dev/command/getStatus", Bytes::new())
            .with_response_topic("reply/here")
            .with_correlation_data(vec![1, 2, 3]);
        assert_eq!(message.response_topic.as_deref(), Some("reply/here"));
        assert_eq!(message.correlation_data.as_deref(), Some(&[1u8, 2, 3][..]));
    }
}
