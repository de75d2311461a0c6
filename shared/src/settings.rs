//! Broker connection settings
//!
//! Settings can be written as a connection string:
//!
//! ```text
//! HostName=broker.local;TcpPort=1883;ClientId=dev-1;KeepAliveInSeconds=30;CleanSession=true;UserName=u;Password=p
//! ```
//!
//! Unknown keys are ignored. A value that fails to parse keeps its default.

use std::fmt;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;

/// Connection parameters for the MQTT broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    /// Empty means "derive one from the device id"
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl MqttSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_MQTT_PORT,
            client_id: String::new(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            clean_session: true,
            username: None,
            password: None,
        }
    }

    /// Parse a `Key=Value;Key=Value` connection string
    pub fn from_connection_string(cs: &str) -> Self {
        let mut settings = Self::default();

        for pair in cs.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "HostName" => settings.host = value.to_string(),
                "TcpPort" => settings.port = value.parse().unwrap_or(settings.port),
                "ClientId" => settings.client_id = value.to_string(),
                "KeepAliveInSeconds" => {
                    settings.keep_alive_secs = value.parse().unwrap_or(settings.keep_alive_secs)
                }
                "CleanSession" => {
                    settings.clean_session = parse_bool(value).unwrap_or(settings.clean_session)
                }
                "UserName" => settings.username = Some(value.to_string()),
                "Password" => settings.password = Some(value.to_string()),
                _ => {}
            }
        }

        settings
    }

    /// Parse an endpoint given on the command line.
    ///
    /// Accepts a connection string, `host`, `host:port`, or `mqtt://host:port`
    /// (`tcp://` is accepted too).
    pub fn from_endpoint(endpoint: &str) -> Self {
        if endpoint.contains('=') {
            return Self::from_connection_string(endpoint);
        }

        let address = endpoint
            .strip_prefix("mqtt://")
            .or_else(|| endpoint.strip_prefix("tcp://"))
            .unwrap_or(endpoint)
            .trim_end_matches('/');

        let mut settings = Self::default();
        match address.rsplit_once(':') {
            Some((host, port)) => {
                settings.host = host.to_string();
                settings.port = port.parse().unwrap_or(DEFAULT_MQTT_PORT);
            }
            None => settings.host = address.to_string(),
        }
        settings
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl fmt::Display for MqttSettings {
    /// Renders the connection string form, never including the password
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostName={};TcpPort={}", self.host, self.port)?;
        if !self.client_id.is_empty() {
            write!(f, ";ClientId={}", self.client_id)?;
        }
        write!(
            f,
            ";CleanSession={};KeepAliveInSeconds={}",
            self.clean_session, self.keep_alive_secs
        )?;
        if let Some(user) = &self.username {
            write!(f, ";UserName={}", user)?;
        }
        Ok(())
    }
}
