//! Status query handler

use super::HandlerContext;
use crate::command::CommandResult;
use tinykube_shared::{codec, GetStatusRequest, GetStatusResponse, ResultCode};

/// Handle getStatus
pub async fn handle_get_status(ctx: &HandlerContext, payload: &[u8]) -> CommandResult {
    if let Err(e) = codec::decode::<GetStatusRequest>(payload) {
        let code = CommandResult::code_of("getStatus", Err(e.into()));
        return CommandResult::reply(
            code,
            &GetStatusResponse {
                result: code.code(),
                ..Default::default()
            },
        );
    }

    let status = ctx.tracker.status();
    let response = GetStatusResponse {
        result: ResultCode::Ok.code(),
        runtime_state: status.runtime.into(),
        module_state: status.module.into(),
        module_name: status.module_name.unwrap_or_default(),
        heap_size: u32::try_from(status.heap_size).unwrap_or(u32::MAX),
        started_at_ms: status.started_at_ms,
        created_at_ms: status.created_at_ms,
    };
    CommandResult::reply(ResultCode::Ok, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handlers::tests::context;
    use tinykube_shared::{ModuleState, RuntimeState};

    #[tokio::test]
    async fn test_status_reflects_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        ctx.tracker.create_environment(65536).unwrap();
        ctx.tracker.store_module_artifact("echo.wasm", b"abc").unwrap();

        let result = handle_get_status(&ctx, &[]).await;
        assert_eq!(result.code, ResultCode::Ok);

        let response: GetStatusResponse = codec::decode(&result.payload).unwrap();
        assert_eq!(response.runtime_state(), RuntimeState::Created);
        assert_eq!(response.module_state(), ModuleState::Stored);
        assert_eq!(response.module_name, "echo.wasm");
        assert_eq!(response.heap_size, 65536);
        assert!(response.created_at_ms > 0);
        assert_eq!(response.started_at_ms, 0);
    }

    #[tokio::test]
    async fn test_idle_status() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let result = handle_get_status(&ctx, &[]).await;
        let response: GetStatusResponse = codec::decode(&result.payload).unwrap();
        assert_eq!(response.runtime_state(), RuntimeState::NotCreated);
        assert_eq!(response.module_state(), ModuleState::Absent);
        assert!(response.module_name.is_empty());
    }
}
