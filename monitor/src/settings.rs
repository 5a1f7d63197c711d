use std::{collections::BTreeMap, time::Duration};

use config::{Config, ConfigError, Environment, File};
use runtime_relay_net::{
    data_types::{MessageCount, SubscriberName, TopicKey, TopicName},
    validation::MAX_CONSUME_LIMIT,
};
use serde::Deserialize;

/// What to do when the remote keeps reporting a topic as not found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopicNotFoundPolicy {
    /// Keep asking for the topic, it may be configured later
    #[default]
    Retry,
    /// Stop asking for the topic once the threshold is reached, other topics carry on
    DropTopic,
    /// Fail the whole relay once the threshold is reached
    Fail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub base_url: String,
    /// Covers the whole request including reading the streamed body
    pub request_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: String::from("http://127.0.0.1:8090"),
            request_timeout_ms: 30_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(self: &Self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(self: &Self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub subscriber: SubscriberName,
    pub topics: Vec<TopicKey>,
    /// Most messages requested per topic in one poll cycle
    pub batch_limit: MessageCount,
    pub poll_interval_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_consecutive_failures: u32,
    pub topic_not_found_policy: TopicNotFoundPolicy,
    pub topic_not_found_threshold: u32,
    pub local_topics: BTreeMap<TopicKey, TopicName>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            subscriber: String::from("runtime-monitor"),
            topics: Vec::new(),
            batch_limit: 100,
            poll_interval_ms: 1_000,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_consecutive_failures: 10,
            topic_not_found_policy: TopicNotFoundPolicy::Retry,
            topic_not_found_threshold: 5,
            local_topics: BTreeMap::new(),
        }
    }
}

impl RelaySettings {
    pub fn poll_interval(self: &Self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_backoff(self: &Self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(self: &Self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Describes the first setting the endpoint would refuse, or None if all are usable
    pub fn validate(self: &Self) -> Option<String> {
        if self.batch_limit == 0 || self.batch_limit > MAX_CONSUME_LIMIT {
            return Some(format!(
                "relay.batch_limit is {} but must be between 1 and {MAX_CONSUME_LIMIT}",
                self.batch_limit
            ));
        }
        if self.subscriber.trim().is_empty() {
            return Some(String::from("relay.subscriber must not be empty"));
        }
        None
    }

    /// Topic name in the local message store for a logical key
    pub fn local_topic(self: &Self, key: &str) -> TopicName {
        match self.local_topics.get(key) {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => key.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OffsetSettings {
    /// `in-memory` or `file-system`
    pub scheme: String,
    pub path: String,
}

impl Default for OffsetSettings {
    fn default() -> Self {
        Self {
            scheme: String::from("file-system"),
            path: String::from("data/offsets"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub remote: RemoteSettings,
    pub relay: RelaySettings,
    pub offsets: OffsetSettings,
}

impl Settings {
    /// Merges `Settings.toml`, then `Settings.<environment>.toml`, then environment
    /// variables prefixed with `RELAY__`. Missing files are skipped.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(File::with_name(&format!("Settings.{environment}")).required(false))
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("relay.topics")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        match settings.relay.validate() {
            Some(msg) => Err(ConfigError::Message(msg)),
            None => Ok(settings),
        }
    }
}
