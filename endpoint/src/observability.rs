use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use log::warn;
use statsd::Client;
use tokio::time;

use crate::settings::MetricsSettings;

/// Counts are accumulated in memory and sent to statsd as one pipeline per second.
/// When metrics are disabled the counts are still kept.
pub struct Metrics {
    client: Option<Mutex<Client>>,
    counts: Mutex<HashMap<String, f64>>,
}

impl Metrics {
    pub const METRIC_HTTP_TOPICS_COUNT: &str = "http.request.topics.count";
    pub const METRIC_HTTP_METADATA_COUNT: &str = "http.request.metadata.count";
    pub const METRIC_HTTP_SHUTDOWN_COUNT: &str = "http.request.shutdown.count";
    pub const METRIC_HTTP_PING_COUNT: &str = "http.request.ping.count";
    pub const METRIC_HTTP_REJECTED_COUNT: &str = "http.request.rejected.count";

    pub const METRIC_RELAY_MESSAGE_COUNT: &str = "relay.message.count";
    pub const METRIC_RELAY_TOPIC_NOT_FOUND_COUNT: &str = "relay.topic_not_found.count";
    pub const METRIC_RELAY_STORE_ERROR_COUNT: &str = "relay.store_error.count";

    pub fn new(settings: &MetricsSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }

        match Client::new(&settings.statsd_address, &settings.prefix) {
            Ok(client) => Self {
                client: Some(Mutex::new(client)),
                counts: Mutex::new(HashMap::with_capacity(20)),
            },
            Err(err) => {
                warn!("Metrics: Unable to reach statsd at {}, metrics disabled: {err}", settings.statsd_address);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: None,
            counts: Mutex::new(HashMap::with_capacity(20)),
        }
    }

    pub fn incr(self: &Self, metric: &str) {
        self.count(metric, 1.0);
    }

    pub fn count(self: &Self, metric: &str, count: f64) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(String::from(metric)).or_insert(0.0) += count;
        }
    }

    /// Count accumulated since the last flush
    pub fn pending(self: &Self, metric: &str) -> f64 {
        match self.counts.lock() {
            Ok(counts) => counts.get(metric).copied().unwrap_or(0.0),
            Err(_) => 0.0,
        }
    }

    pub async fn run(self: &Self, stop_signal: &Arc<AtomicBool>) {
        let statsd = match &self.client {
            Some(statsd) => statsd,
            None => return,
        };

        let stop_signal = stop_signal.clone();
        while !stop_signal.load(Ordering::Relaxed) {
            time::sleep(Duration::from_millis(1000)).await;

            let (client, mut counts) = match (statsd.lock(), self.counts.lock()) {
                (Ok(client), Ok(counts)) => (client, counts),
                _ => return,
            };

            let mut pipeline = client.pipeline();
            for (metric, count) in counts.iter() {
                pipeline.count(metric, *count);
            }

            pipeline.send(&client);
            counts.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Metrics;

    #[test]
    fn should_accumulate_counts() {
        let metrics = Metrics::disabled();
        metrics.incr(Metrics::METRIC_HTTP_PING_COUNT);
        metrics.incr(Metrics::METRIC_HTTP_PING_COUNT);
        metrics.count(Metrics::METRIC_RELAY_MESSAGE_COUNT, 42.0);

        assert_eq!(metrics.pending(Metrics::METRIC_HTTP_PING_COUNT), 2.0);
        assert_eq!(metrics.pending(Metrics::METRIC_RELAY_MESSAGE_COUNT), 42.0);
        assert_eq!(metrics.pending(Metrics::METRIC_HTTP_SHUTDOWN_COUNT), 0.0);
    }
}
