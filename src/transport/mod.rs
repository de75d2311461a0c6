//! Message transport between the broker and the dispatcher

pub mod message;
pub mod mqtt;
pub mod traits;

pub use message::{InboundMessage, MessageProperties, OutboundMessage};
pub use mqtt::MqttPublisher;
pub use traits::ReplyPublisher;
