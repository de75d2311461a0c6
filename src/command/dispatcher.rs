//! Protocol dispatcher - routes inbound commands to handlers and publishes
//! the correlated reply

use super::handlers::{self, HandlerContext};
use crate::error::AgentError;
use crate::transport::{InboundMessage, MessageProperties, OutboundMessage, ReplyPublisher};
use bytes::Bytes;
use prost::Message;
use tinykube_shared::topic::{self, UnknownVerb};
use tinykube_shared::{codec, protocol, ResultCategory, ResultCode, Verb};
use tracing::{debug, error, info, warn};

/// Outcome of one handler: the code and the encoded reply payload
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub code: ResultCode,
    pub payload: Bytes,
}

impl CommandResult {
    /// Encode `message` as the reply payload
    pub fn reply<M: Message>(code: ResultCode, message: &M) -> Self {
        let payload = codec::encode(message).unwrap_or_else(|e| {
            error!("Failed to encode reply: {}", e);
            Bytes::new()
        });
        Self { code, payload }
    }

    /// Collapse a handler outcome into its result code, logging failures
    pub fn code_of(verb: &str, outcome: Result<(), AgentError>) -> ResultCode {
        match outcome {
            Ok(()) => ResultCode::Ok,
            Err(e) => {
                warn!("{} rejected: {}", verb, e);
                e.result_code()
            }
        }
    }
}

/// Routes commands by verb and answers on the caller's reply topic
pub struct CommandDispatcher<P: ReplyPublisher> {
    ctx: HandlerContext,
    publisher: P,
}

impl<P: ReplyPublisher> CommandDispatcher<P> {
    pub fn new(ctx: HandlerContext, publisher: P) -> Self {
        Self { ctx, publisher }
    }

    /// Execute one inbound command and publish its reply.
    ///
    /// Unknown verbs are dropped without executing. A command without a
    /// response topic or correlation data still runs, but its reply is
    /// abandoned. A failed publish is logged; the command's effect stands.
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<ResultCode, AgentError> {
        let verb = topic::verb_segment(&message.topic)
            .ok_or_else(|| UnknownVerb(message.topic.clone()))
            .and_then(|segment| segment.parse::<Verb>())
            .inspect_err(|e| warn!("Dropping command on {}: {}", message.topic, e))?;

        debug!("Received {} ({} bytes)", verb, message.payload.len());
        let result = self.execute(verb, &message.payload).await;
        match result.code.category() {
            ResultCategory::Success => info!("{} -> {}", verb, result.code),
            ResultCategory::Validation | ResultCategory::StateConflict => {
                info!("{} rejected: {}", verb, result.code)
            }
            ResultCategory::Resource => warn!("{} failed: {}", verb, result.code),
        }

        let response_topic = match message.response_topic.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                warn!("Not replying to {} on {}: no response topic", verb, message.topic);
                return Err(AgentError::MissingCorrelationMetadata("a response topic"));
            }
        };
        let Some(correlation_data) = message.correlation_data.clone() else {
            warn!("Not replying to {} on {}: no correlation data", verb, message.topic);
            return Err(AgentError::MissingCorrelationMetadata("correlation data"));
        };

        let reply = build_reply(response_topic, correlation_data, result.payload);
        if let Err(e) = self.publisher.publish(reply).await {
            error!("Failed to publish {} reply via {}: {}", verb, self.publisher.name(), e);
        }
        Ok(result.code)
    }

    async fn execute(&self, verb: Verb, payload: &[u8]) -> CommandResult {
        let ctx = &self.ctx;
        match verb {
            Verb::CreateRuntime => handlers::handle_create_runtime(ctx, payload).await,
            Verb::DestroyRuntime => handlers::handle_destroy_runtime(ctx, payload).await,
            Verb::AddModule => handlers::handle_add_module(ctx, payload).await,
            Verb::RemoveModule => handlers::handle_remove_module(ctx, payload).await,
            Verb::StartModule => handlers::handle_start_module(ctx, payload).await,
            Verb::StopModule => handlers::handle_stop_module(ctx, payload).await,
            Verb::GetStatus => handlers::handle_get_status(ctx, payload).await,
        }
    }
}

/// Reply addressed to the caller, echoing its correlation data
fn build_reply(response_topic: String, correlation_data: Bytes, payload: Bytes) -> OutboundMessage {
    let (status_key, status_value) = protocol::STATUS_PROPERTY;
    OutboundMessage {
        topic: response_topic,
        payload,
        properties: MessageProperties {
            correlation_data: Some(correlation_data),
            content_type: Some(protocol::CONTENT_TYPE.to_string()),
            topic_alias: Some(protocol::TOPIC_ALIAS_HINT),
            user_properties: vec![(status_key.to_string(), status_value.to_string())],
        },
    }
}
