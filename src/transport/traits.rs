//! Publisher abstraction between the dispatcher and the broker client

use super::message::OutboundMessage;
use anyhow::Result;
use async_trait::async_trait;

/// Sink for replies
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    /// Publish a reply at QoS 1, not retained
    async fn publish(&self, message: OutboundMessage) -> Result<()>;

    /// Human-readable name for this publisher
    fn name(&self) -> &'static str;
}
