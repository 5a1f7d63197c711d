use std::sync::{atomic::AtomicBool, Arc};

use observability::Metrics;
use runtime_relay_storage::message_store::MessageStore;
use services::{
    relay_service::RelayService,
    shutdown_service::{ShutdownAction, ShutdownService},
};
use settings::Settings;
use topics::TopicResolver;

/// Typed configuration merged from settings files and the environment
pub mod settings;

/// Maps logical topic keys onto the topic names configured on this side
pub mod topics;

/// Bounded buffer that hands the response body to the transport in chunks
pub mod chunked;

/// Business logic behind the http API
pub mod services;

/// Counters published to statsd
pub mod observability;

/// Http REST API that the monitor polls
pub mod api_http_warp;

/// Container for the application singletons. Handlers receive an Arc of this rather than
/// each dependency individually.
pub struct App {
    pub stop_signal: Arc<AtomicBool>,
    pub settings: Arc<Settings>,
    pub metrics: Arc<Metrics>,
    pub relay_service: Arc<RelayService>,
    pub shutdown_service: Arc<ShutdownService>,
}

impl App {
    pub fn new(
        settings: Settings,
        store: Arc<dyn MessageStore>,
        metrics: Arc<Metrics>,
        stop_signal: Arc<AtomicBool>,
        shutdown_action: ShutdownAction,
    ) -> Self {
        let resolver = Arc::new(TopicResolver::new(settings.topics.clone()));
        let relay_service = Arc::new(RelayService::new(
            store,
            resolver,
            settings.relay.max_messages_per_read,
            &metrics,
        ));

        Self {
            stop_signal,
            settings: Arc::new(settings),
            metrics,
            relay_service,
            shutdown_service: Arc::new(ShutdownService::new(shutdown_action)),
        }
    }
}
