//! Command execution for the device agent
//!
//! This module handles:
//! - Routing inbound commands by verb
//! - Decoding payloads and calling into the runtime
//! - Publishing the correlated reply

mod dispatcher;
pub mod handlers;

pub use dispatcher::{CommandDispatcher, CommandResult};
