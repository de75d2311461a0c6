//! Request payloads built from command line arguments, and reply summaries

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use std::path::Path;
use tinykube_shared::{
    codec, AddModuleRequest, CommandResponse, CreateRuntimeRequest, DestroyRuntimeRequest,
    GetStatusRequest, GetStatusResponse, ModuleRequest, ResultCode, RuntimeResponse, Verb,
};

/// Encode the request for `verb`.
///
/// `createRuntime` takes an optional heap size, `addModule` a file path
/// (the module is named after the file), the other module verbs a name.
pub fn build_request(verb: Verb, arg: Option<&str>) -> Result<Bytes> {
    let payload = match verb {
        Verb::CreateRuntime => {
            let heap_size = match arg {
                Some(size) => size.parse().with_context(|| format!("Invalid heap size: {size}"))?,
                None => tinykube_shared::protocol::DEFAULT_HEAP_SIZE as u32,
            };
            codec::encode(&CreateRuntimeRequest { heap_size })?
        }
        Verb::DestroyRuntime => codec::encode(&DestroyRuntimeRequest {})?,
        Verb::AddModule => {
            let path = Path::new(arg.context("addModule needs a module file")?);
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("No file name in {}", path.display()))?;
            let content =
                std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
            codec::encode(&AddModuleRequest::with_content(name, content))?
        }
        Verb::RemoveModule | Verb::StartModule | Verb::StopModule => {
            let Some(name) = arg else {
                bail!("{verb} needs a module name");
            };
            codec::encode(&ModuleRequest::new(name))?
        }
        Verb::GetStatus => codec::encode(&GetStatusRequest {})?,
    };
    Ok(payload)
}

/// Decoded reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplySummary {
    pub result: i32,
    pub detail: String,
}

impl ReplySummary {
    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok.code()
    }
}

/// Decode a reply payload according to the verb it answers
pub fn summarize_reply(verb: Verb, payload: &[u8]) -> Result<ReplySummary> {
    let summary = match verb {
        Verb::CreateRuntime | Verb::DestroyRuntime => {
            let reply: RuntimeResponse = codec::decode(payload)?;
            ReplySummary {
                result: reply.result,
                detail: format!("runtime created={}", reply.created.unwrap_or(false)),
            }
        }
        Verb::GetStatus => {
            let reply: GetStatusResponse = codec::decode(payload)?;
            ReplySummary {
                result: reply.result,
                detail: format!(
                    "runtime={:?} heap={} module={:?} name={:?} started_at={}",
                    reply.runtime_state(),
                    reply.heap_size,
                    reply.module_state(),
                    reply.module_name,
                    reply.started_at_ms
                ),
            }
        }
        _ => {
            let reply: CommandResponse = codec::decode(payload)?;
            ReplySummary {
                result: reply.result,
                detail: String::new(),
            }
        }
    };
    Ok(summary)
}

/// Human-readable name of a result code
pub fn describe_result(result: i32) -> String {
    match ResultCode::from_code(result) {
        Some(code) => code.to_string(),
        None => format!("unknown result {result}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_module_request_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.wasm");
        std::fs::write(&path, [0u8; 12]).unwrap();

        let payload = build_request(Verb::AddModule, path.to_str()).unwrap();
        let request: AddModuleRequest = codec::decode(&payload).unwrap();
        assert_eq!(request.name, "echo.wasm");
        assert_eq!(request.size, 12);
        assert_eq!(request.content.len(), 12);
    }

    #[test]
    fn test_missing_arguments() {
        assert!(build_request(Verb::StartModule, None).is_err());
        assert!(build_request(Verb::AddModule, None).is_err());
        assert!(build_request(Verb::CreateRuntime, Some("lots")).is_err());
    }

    #[test]
    fn test_create_runtime_default_heap() {
        let payload = build_request(Verb::CreateRuntime, None).unwrap();
        let request: CreateRuntimeRequest = codec::decode(&payload).unwrap();
        assert_eq!(request.heap_size, 512 * 1024);
    }

    #[test]
    fn test_summaries() {
        let payload = codec::encode(&RuntimeResponse::new(ResultCode::AlreadyCreated, true)).unwrap();
        let summary = summarize_reply(Verb::CreateRuntime, &payload).unwrap();
        assert_eq!(summary.result, -10);
        assert!(!summary.is_ok());
        assert_eq!(summary.detail, "runtime created=true");

        let payload = codec::encode(&CommandResponse::new(ResultCode::Ok)).unwrap();
        assert!(summarize_reply(Verb::StopModule, &payload).unwrap().is_ok());

        assert_eq!(describe_result(-99), "unknown result -99");
    }
}
