//! Command topic grammar
//!
//! ```text
//! {namespace}/{deviceId}/command/{verb}
//! {namespace}/{deviceId}/command/{verb}/__for_{clientId}   (replies)
//! ```

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Path segment separating the device id from the verb
pub const COMMAND_SEGMENT: &str = "command";

/// Command verbs understood by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    CreateRuntime,
    DestroyRuntime,
    AddModule,
    RemoveModule,
    StartModule,
    StopModule,
    GetStatus,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command verb: {0}")]
pub struct UnknownVerb(pub String);

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::CreateRuntime,
        Verb::DestroyRuntime,
        Verb::AddModule,
        Verb::RemoveModule,
        Verb::StartModule,
        Verb::StopModule,
        Verb::GetStatus,
    ];

    /// Canonical topic segment for this verb
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::CreateRuntime => "createRuntime",
            Verb::DestroyRuntime => "destroyRuntime",
            Verb::AddModule => "addModule",
            Verb::RemoveModule => "removeModule",
            Verb::StartModule => "startModule",
            Verb::StopModule => "stopModule",
            Verb::GetStatus => "getStatus",
        }
    }
}

impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createRuntime" | "createWamrRuntime" => Ok(Verb::CreateRuntime),
            "destroyRuntime" | "destroyWamrRuntime" => Ok(Verb::DestroyRuntime),
            "addModule" => Ok(Verb::AddModule),
            "removeModule" => Ok(Verb::RemoveModule),
            "startModule" => Ok(Verb::StartModule),
            "stopModule" => Ok(Verb::StopModule),
            "getStatus" => Ok(Verb::GetStatus),
            other => Err(UnknownVerb(other.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wildcard filter matching every device's command namespace
pub fn subscription_filter(namespace: &str) -> String {
    format!("{namespace}/+/{COMMAND_SEGMENT}/+")
}

/// Topic a command for `device_id` is published on
pub fn command_topic(namespace: &str, device_id: &str, verb: Verb) -> String {
    format!("{namespace}/{device_id}/{COMMAND_SEGMENT}/{verb}")
}

/// Conventional reply topic for a caller identified by `client_id`
pub fn reply_topic(namespace: &str, device_id: &str, verb: Verb, client_id: &str) -> String {
    format!("{}/__for_{client_id}", command_topic(namespace, device_id, verb))
}

/// Last path segment of a topic, which names the command verb
pub fn verb_segment(topic: &str) -> Option<&str> {
    match topic.rsplit_once('/') {
        Some((_, verb)) if !verb.is_empty() => Some(verb),
        _ => None,
    }
}

/// Device id of a `{namespace}/{deviceId}/command/{verb}` topic
pub fn device_segment(topic: &str) -> Option<&str> {
    let segments: Vec<&str> = topic.split('/').collect();
    match segments.as_slice() {
        [_, device, COMMAND_SEGMENT, _] => Some(*device),
        _ => None,
    }
}
