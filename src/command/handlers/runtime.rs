//! Runtime command handlers (create, destroy)

use super::HandlerContext;
use crate::command::CommandResult;
use crate::error::AgentError;
use tinykube_shared::{codec, CreateRuntimeRequest, DestroyRuntimeRequest, RuntimeResponse, RuntimeState};
use tracing::warn;

/// Handle createRuntime
pub async fn handle_create_runtime(ctx: &HandlerContext, payload: &[u8]) -> CommandResult {
    let outcome = codec::decode::<CreateRuntimeRequest>(payload)
        .map_err(AgentError::from)
        .and_then(|request| {
            ctx.tracker
                .create_environment(request.heap_size as usize)
                .map_err(AgentError::from)
        });
    runtime_reply(ctx, "createRuntime", outcome)
}

/// Handle destroyRuntime
pub async fn handle_destroy_runtime(ctx: &HandlerContext, payload: &[u8]) -> CommandResult {
    let outcome = codec::decode::<DestroyRuntimeRequest>(payload)
        .map_err(AgentError::from)
        .and_then(|_| ctx.tracker.destroy_environment().map_err(AgentError::from));
    runtime_reply(ctx, "destroyRuntime", outcome)
}

/// Both replies carry whether the runtime exists afterwards
fn runtime_reply(ctx: &HandlerContext, verb: &str, outcome: Result<(), AgentError>) -> CommandResult {
    let code = CommandResult::code_of(verb, outcome);
    let created = ctx.tracker.status().runtime == RuntimeState::Created;
    if !code.is_ok() {
        warn!("{} rejected, runtime created={}", verb, created);
    }
    CommandResult::reply(code, &RuntimeResponse::new(code, created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handlers::tests::context;
    use tinykube_shared::ResultCode;

    fn create_payload(heap_size: u32) -> Vec<u8> {
        codec::encode(&CreateRuntimeRequest { heap_size }).unwrap().to_vec()
    }

    fn decode(result: &CommandResult) -> RuntimeResponse {
        codec::decode(&result.payload).unwrap()
    }

    #[tokio::test]
    async fn test_create_destroy_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let result = handle_create_runtime(&ctx, &create_payload(65536)).await;
        assert_eq!(result.code, ResultCode::Ok);
        assert_eq!(decode(&result), RuntimeResponse::new(ResultCode::Ok, true));

        let result = handle_create_runtime(&ctx, &create_payload(65536)).await;
        assert_eq!(result.code, ResultCode::AlreadyCreated);
        assert_eq!(decode(&result).result, -10);
        assert_eq!(decode(&result).created, Some(true));

        let result = handle_destroy_runtime(&ctx, &[]).await;
        assert_eq!(result.code, ResultCode::Ok);
        assert_eq!(decode(&result).created, Some(false));

        let result = handle_destroy_runtime(&ctx, &[]).await;
        assert_eq!(result.code, ResultCode::NotCreated);
        assert_eq!(decode(&result).created, Some(false));
    }

    #[tokio::test]
    async fn test_create_with_malformed_payload() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let result = handle_create_runtime(&ctx, &[0xff, 0xff, 0xff]).await;
        assert_eq!(result.code, ResultCode::MalformedPayload);
        assert_eq!(ctx.tracker.status().runtime, RuntimeState::NotCreated);
    }

    #[tokio::test]
    async fn test_create_with_zero_budget() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let result = handle_create_runtime(&ctx, &create_payload(0)).await;
        assert_eq!(result.code, ResultCode::AllocationFailed);
        assert_eq!(decode(&result).created, Some(false));
    }
}
