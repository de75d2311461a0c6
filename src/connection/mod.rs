//! Broker session management
//!
//! This module handles:
//! - The MQTT v5 session with automatic reconnection
//! - Re-subscribing to the command filter on every connect
//! - Forwarding inbound commands to the agent's main loop

mod manager;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager};
