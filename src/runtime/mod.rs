//! Execution environment and module lifecycle
//!
//! - `tracker`: owns environment and module slot state, the only writer of status
//! - `artifact`: module files under the storage root
//! - `engine`: WebAssembly engine setup and module execution
//! - `supervisor`: runs a module on a dedicated thread and cancels it on demand

pub mod artifact;
pub mod engine;
pub mod supervisor;
pub mod tracker;

pub use artifact::ArtifactStore;
pub use supervisor::ExecutionSupervisor;
pub use tracker::{EnvironmentLimits, ResourceTracker, StatusSnapshot};

use std::io;
use thiserror::Error;
use tinykube_shared::state_machine::Conflict;
use tinykube_shared::ResultCode;

/// Errors raised by resource tracking and execution supervision
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("Invalid module name: {0:?}")]
    InvalidModuleName(String),

    #[error("Cannot reserve {budget} bytes for the runtime: {reason}")]
    AllocationFailed { budget: usize, reason: String },

    #[error("Failed to write module {name}: {source}")]
    WriteFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Failed to launch execution thread: {0}")]
    Launch(#[source] io::Error),
}

impl RuntimeError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            RuntimeError::Conflict(conflict) => conflict.result_code(),
            RuntimeError::InvalidModuleName(_) => ResultCode::InvalidModuleName,
            RuntimeError::AllocationFailed { .. } => ResultCode::AllocationFailed,
            RuntimeError::WriteFailed { .. } => ResultCode::WriteFailed,
            RuntimeError::NotFound(_) => ResultCode::NotFound,
            RuntimeError::Launch(_) => ResultCode::EngineFailure,
        }
    }
}
