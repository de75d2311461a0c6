//! Module command handlers (add, remove, start, stop)

use super::HandlerContext;
use crate::command::CommandResult;
use crate::error::AgentError;
use tinykube_shared::{codec, AddModuleRequest, CommandResponse, ModuleRequest};
use tracing::info;

/// Handle addModule
///
/// The declared size must match the content length; nothing is written
/// otherwise.
pub async fn handle_add_module(ctx: &HandlerContext, payload: &[u8]) -> CommandResult {
    let outcome = add_module(ctx, payload);
    reply("addModule", outcome)
}

fn add_module(ctx: &HandlerContext, payload: &[u8]) -> Result<(), AgentError> {
    let request: AddModuleRequest = codec::decode(payload)?;
    let declared = request.size as usize;
    if declared != request.content.len() {
        return Err(AgentError::SizeMismatch {
            declared,
            actual: request.content.len(),
        });
    }

    info!("Adding module {} ({} bytes)", request.name, declared);
    ctx.tracker.store_module_artifact(&request.name, &request.content)?;
    Ok(())
}

/// Handle removeModule
pub async fn handle_remove_module(ctx: &HandlerContext, payload: &[u8]) -> CommandResult {
    let outcome = codec::decode::<ModuleRequest>(payload)
        .map_err(AgentError::from)
        .and_then(|request| {
            info!("Removing module {}", request.name);
            ctx.tracker
                .delete_module_artifact(&request.name)
                .map_err(AgentError::from)
        });
    reply("removeModule", outcome)
}

/// Handle startModule
///
/// Replies as soon as the execution thread is launched.
pub async fn handle_start_module(ctx: &HandlerContext, payload: &[u8]) -> CommandResult {
    let outcome = codec::decode::<ModuleRequest>(payload)
        .map_err(AgentError::from)
        .and_then(|request| {
            info!("Starting module {}", request.name);
            ctx.supervisor
                .start_module(&request.name)
                .map_err(AgentError::from)
        });
    reply("startModule", outcome)
}

/// Handle stopModule
pub async fn handle_stop_module(ctx: &HandlerContext, payload: &[u8]) -> CommandResult {
    let outcome = match codec::decode::<ModuleRequest>(payload) {
        Ok(request) => {
            info!("Stopping module {}", request.name);
            ctx.supervisor
                .stop_module(&request.name)
                .await
                .map(|outcome| info!("Module stop outcome: {:?}", outcome))
                .map_err(AgentError::from)
        }
        Err(e) => Err(e.into()),
    };
    reply("stopModule", outcome)
}

fn reply(verb: &str, outcome: Result<(), AgentError>) -> CommandResult {
    let code = CommandResult::code_of(verb, outcome);
    CommandResult::reply(code, &CommandResponse::new(code))
}
