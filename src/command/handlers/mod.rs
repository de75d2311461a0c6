//! Command handlers, one per verb
//!
//! A handler decodes its payload, validates it, calls into the runtime and
//! returns the encoded reply. Handlers never publish.

mod module;
mod runtime;
mod status;

pub use module::{handle_add_module, handle_remove_module, handle_start_module, handle_stop_module};
pub use runtime::{handle_create_runtime, handle_destroy_runtime};
pub use status::handle_get_status;

use crate::runtime::{ExecutionSupervisor, ResourceTracker};
use std::sync::Arc;

/// Context passed to command handlers
#[derive(Clone)]
pub struct HandlerContext {
    pub tracker: Arc<ResourceTracker>,
    pub supervisor: Arc<ExecutionSupervisor>,
}

impl HandlerContext {
    pub fn new(supervisor: Arc<ExecutionSupervisor>) -> Self {
        Self {
            tracker: supervisor.tracker().clone(),
            supervisor,
        }
    }
}
