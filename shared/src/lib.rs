//! TinyKube Shared Protocol Types
//!
//! This crate provides the command payloads, topic grammar, result codes and
//! lifecycle rules shared by the device agent and the controller.

pub mod codec;
pub mod proto;
pub mod result;
pub mod settings;
pub mod state_machine;
pub mod topic;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use proto::*;
pub use result::{ResultCategory, ResultCode};
pub use topic::Verb;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol constants for the command channel
pub mod protocol {
    /// Default topic namespace
    pub const DEFAULT_NAMESPACE: &str = "tinykube";

    /// Content type tag placed on every reply
    pub const CONTENT_TYPE: &str = "application/protobuf";

    /// Topic alias hint placed on every reply
    pub const TOPIC_ALIAS_HINT: u16 = 1;

    /// Diagnostic user property placed on every reply
    pub const STATUS_PROPERTY: (&str, &str) = ("Status", "200");

    /// Memory budget for an environment created implicitly by `startModule`
    pub const DEFAULT_HEAP_SIZE: usize = 512 * 1024;

    /// How long a caller waits for a correlated reply
    pub const COMMAND_REPLY_TIMEOUT_MS: u64 = 5000;
}

impl RuntimeResponse {
    pub fn new(result: ResultCode, created: bool) -> Self {
        Self {
            result: result.code(),
            created: Some(created),
        }
    }
}

impl CommandResponse {
    pub fn new(result: ResultCode) -> Self {
        Self {
            result: result.code(),
        }
    }
}

impl AddModuleRequest {
    /// Build a request whose declared size matches the content
    pub fn with_content(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: content.len() as u32,
            content,
        }
    }
}

impl ModuleRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
