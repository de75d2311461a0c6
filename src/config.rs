//! Agent configuration
//!
//! Defaults live in code. The optional ENDPOINT argument and `TINYKUBE_*`
//! environment variables override them.

use crate::connection::ConnectionConfig;
use crate::runtime::supervisor::DEFAULT_STOP_TIMEOUT;
use crate::runtime::EnvironmentLimits;
use std::path::PathBuf;
use std::time::Duration;
use tinykube_shared::protocol;
use tinykube_shared::settings::MqttSettings;
use tinykube_shared::topic;

pub const ENV_CONNECTION_STRING: &str = "TINYKUBE_CONNECTION_STRING";
pub const ENV_DEVICE_ID: &str = "TINYKUBE_DEVICE_ID";
pub const ENV_NAMESPACE: &str = "TINYKUBE_NAMESPACE";
pub const ENV_STORAGE_ROOT: &str = "TINYKUBE_STORAGE_ROOT";

pub const DEFAULT_DEVICE_ID: &str = "tinykube-device";
pub const DEFAULT_STORAGE_ROOT: &str = "./wasm-module";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub namespace: String,
    pub device_id: String,
    pub mqtt: MqttSettings,
    /// Directory holding module artifacts
    pub storage_root: PathBuf,
    pub limits: EnvironmentLimits,
    /// How long stopModule waits for the guest to observe cancellation
    pub stop_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let mut mqtt = MqttSettings::default();
        mqtt.client_id = DEFAULT_DEVICE_ID.into();
        Self {
            namespace: protocol::DEFAULT_NAMESPACE.into(),
            device_id: DEFAULT_DEVICE_ID.into(),
            mqtt,
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            limits: EnvironmentLimits::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl AgentConfig {
    /// Build the configuration from the command line endpoint and the process environment
    pub fn load(endpoint: Option<&str>) -> Self {
        Self::from_sources(endpoint, |key| std::env::var(key).ok())
    }

    /// Build the configuration from an endpoint and a variable lookup.
    ///
    /// The endpoint argument wins over `TINYKUBE_CONNECTION_STRING`. The device
    /// id comes from `TINYKUBE_DEVICE_ID`, else the broker client id; an empty
    /// client id is filled with the device id.
    pub fn from_sources(endpoint: Option<&str>, var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| non_empty(ENV_CONNECTION_STRING));
        if let Some(endpoint) = endpoint {
            config.mqtt = MqttSettings::from_endpoint(&endpoint);
        }

        config.device_id = match non_empty(ENV_DEVICE_ID) {
            Some(id) => id,
            None if !config.mqtt.client_id.is_empty() => config.mqtt.client_id.clone(),
            None => DEFAULT_DEVICE_ID.into(),
        };
        if config.mqtt.client_id.is_empty() {
            config.mqtt.client_id = config.device_id.clone();
        }

        if let Some(namespace) = non_empty(ENV_NAMESPACE) {
            config.namespace = namespace;
        }
        if let Some(root) = non_empty(ENV_STORAGE_ROOT) {
            config.storage_root = PathBuf::from(root);
        }
        config
    }

    /// Session settings for the connection manager
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            settings: self.mqtt.clone(),
            subscription: topic::subscription_filter(&self.namespace),
            reconnect_delay: self.reconnect_delay,
            max_reconnect_delay: self.max_reconnect_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(endpoint: Option<&str>, vars: &[(&str, &str)]) -> AgentConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_sources(endpoint, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(None, &[]);
        assert_eq!(config.namespace, "tinykube");
        assert_eq!(config.device_id, DEFAULT_DEVICE_ID);
        assert_eq!(config.mqtt.client_id, DEFAULT_DEVICE_ID);
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.storage_root, PathBuf::from("./wasm-module"));
        assert_eq!(config.limits.default_budget, 512 * 1024);
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
        assert_eq!(config.connection().subscription, "tinykube/+/command/+");
    }

    #[test]
    fn test_endpoint_argument() {
        let config = load(Some("mqtt://broker.local:2883"), &[]);
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 2883);
        assert_eq!(config.mqtt.client_id, DEFAULT_DEVICE_ID);
    }

    #[test]
    fn test_connection_string_client_id_names_device() {
        let config = load(None, &[(ENV_CONNECTION_STRING, "HostName=h;ClientId=edge-7")]);
        assert_eq!(config.mqtt.host, "h");
        assert_eq!(config.device_id, "edge-7");
    }

    #[test]
    fn test_argument_beats_environment() {
        let config = load(
            Some("arg-host"),
            &[(ENV_CONNECTION_STRING, "HostName=env-host"), (ENV_DEVICE_ID, "dev-9")],
        );
        assert_eq!(config.mqtt.host, "arg-host");
        assert_eq!(config.device_id, "dev-9");
        assert_eq!(config.mqtt.client_id, "dev-9");
    }

    #[test]
    fn test_namespace_and_storage_overrides() {
        let config = load(
            None,
            &[(ENV_NAMESPACE, "lab"), (ENV_STORAGE_ROOT, "/var/lib/modules"), (ENV_DEVICE_ID, " ")],
        );
        assert_eq!(config.namespace, "lab");
        assert_eq!(config.storage_root, PathBuf::from("/var/lib/modules"));
        assert_eq!(config.device_id, DEFAULT_DEVICE_ID);
        assert_eq!(config.connection().subscription, "lab/+/command/+");
    }
}
