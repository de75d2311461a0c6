//! Agent-level errors

use crate::runtime::RuntimeError;
use thiserror::Error;
use tinykube_shared::codec::CodecError;
use tinykube_shared::topic::UnknownVerb;
use tinykube_shared::ResultCode;

/// Errors raised while handling one inbound command
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] CodecError),

    #[error("Declared size {declared} does not match content length {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The command has run but its reply cannot be addressed, so nothing is published
    #[error("Command is missing {0}")]
    MissingCorrelationMetadata(&'static str),

    /// The command is dropped without a reply
    #[error(transparent)]
    UnknownVerb(#[from] UnknownVerb),
}

impl AgentError {
    /// Code placed in the reply. Protocol errors never produce a reply but
    /// still map to a code for logging.
    pub fn result_code(&self) -> ResultCode {
        match self {
            AgentError::MalformedPayload(_) => ResultCode::MalformedPayload,
            AgentError::SizeMismatch { .. } => ResultCode::SizeMismatch,
            AgentError::Runtime(e) => e.result_code(),
            AgentError::MissingCorrelationMetadata(_) | AgentError::UnknownVerb(_) => {
                ResultCode::MalformedPayload
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinykube_shared::state_machine::Conflict;

    #[test]
    fn test_runtime_errors_keep_their_codes() {
        let err: AgentError = RuntimeError::from(Conflict::AlreadyCreated).into();
        assert_eq!(err.result_code(), ResultCode::AlreadyCreated);

        let err: AgentError = RuntimeError::NotFound("echo.wasm".into()).into();
        assert_eq!(err.result_code(), ResultCode::NotFound);
    }

    #[test]
    fn test_validation_codes() {
        let err = AgentError::SizeMismatch { declared: 12, actual: 10 };
        assert_eq!(err.result_code(), ResultCode::SizeMismatch);
        assert_eq!(err.to_string(), "Declared size 12 does not match content length 10");

        let err: AgentError = CodecError::PayloadTooLarge(usize::MAX).into();
        assert_eq!(err.result_code(), ResultCode::MalformedPayload);
    }
}
