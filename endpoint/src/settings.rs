use std::collections::BTreeMap;

use config::{Config, ConfigError, Environment, File};
use runtime_relay_net::{
    data_types::{PortNumber, TopicKey, TopicName},
    validation::MAX_CONSUME_LIMIT,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub ip_address: String,
    pub port: PortNumber,
    pub max_request_bytes: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ip_address: String::from("127.0.0.1"),
            port: 8090,
            max_request_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Buffered response bytes that trigger sending a chunk
    pub chunk_size: usize,
    /// Messages read from the store in one fetch while filling a request's limit
    pub max_messages_per_read: usize,
    /// Largest per topic limit a request may ask for
    pub max_limit: u32,
    /// Chunks queued between the store reader and the http connection
    pub channel_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            max_messages_per_read: 100,
            max_limit: MAX_CONSUME_LIMIT,
            channel_capacity: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub statsd_address: String,
    pub prefix: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            statsd_address: String::from("127.0.0.1:8125"),
            prefix: String::from("runtime.relay.endpoint"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub metrics: MetricsSettings,
    pub topics: BTreeMap<TopicKey, TopicName>,
}

impl Settings {
    /// Merges `Settings.toml`, then `Settings.<environment>.toml`, then environment
    /// variables prefixed with `RELAY__`. Missing files are skipped.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(File::with_name(&format!("Settings.{environment}")).required(false))
            .add_source(Environment::with_prefix("RELAY").separator("__"))
            .build()?
            .try_deserialize::<Settings>()
    }
}
