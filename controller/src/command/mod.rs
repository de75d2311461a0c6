//! Command dispatch and reply tracking for the controller
//!
//! This module handles:
//! - Building request payloads per verb
//! - Publishing commands with correlation metadata
//! - Matching replies to pending commands
//! - Reporting commands whose reply timed out

mod dispatcher;
mod request;
mod timeout;

pub use dispatcher::CommandDispatcher;
pub use request::{build_request, describe_result, summarize_reply};
pub use timeout::TimeoutTracker;
