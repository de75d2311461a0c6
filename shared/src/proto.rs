//! Command and response payloads
//!
//! Each command verb carries its own request message; replies carry a
//! result code and, for a few verbs, extra state.

use prost::{Enumeration, Message};

/// Execution environment state as reported on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum RuntimeState {
    NotCreated = 0,
    Created = 1,
}

/// Module slot state as reported on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ModuleState {
    Absent = 0,
    Stored = 1,
    Running = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateRuntimeRequest {
    /// Memory budget in bytes
    #[prost(uint32, tag = "1")]
    pub heap_size: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct DestroyRuntimeRequest {}

/// Reply to create/destroy runtime
#[derive(Clone, PartialEq, Message)]
pub struct RuntimeResponse {
    #[prost(int32, tag = "1")]
    pub result: i32,

    /// Whether the runtime exists after the command was applied
    #[prost(bool, optional, tag = "2")]
    pub created: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddModuleRequest {
    #[prost(string, tag = "1")]
    pub name: String,

    /// Declared content length, must match `content.len()`
    #[prost(uint32, tag = "2")]
    pub size: u32,

    #[prost(bytes = "vec", tag = "3")]
    pub content: Vec<u8>,
}

/// Request naming a single module (remove, start, stop)
#[derive(Clone, PartialEq, Message)]
pub struct ModuleRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Reply carrying only a result code
#[derive(Clone, PartialEq, Message)]
pub struct CommandResponse {
    #[prost(int32, tag = "1")]
    pub result: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetStatusRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetStatusResponse {
    #[prost(int32, tag = "1")]
    pub result: i32,

    #[prost(enumeration = "RuntimeState", tag = "2")]
    pub runtime_state: i32,

    #[prost(enumeration = "ModuleState", tag = "3")]
    pub module_state: i32,

    #[prost(string, tag = "4")]
    pub module_name: String,

    #[prost(uint32, tag = "5")]
    pub heap_size: u32,

    #[prost(uint64, tag = "6")]
    pub started_at_ms: u64,

    #[prost(uint64, tag = "7")]
    pub created_at_ms: u64,
}
