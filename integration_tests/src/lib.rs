/*
Runs a real relay endpoint on an ephemeral port so that tests can point the monitor's
http client at it.
*/

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use log::info;
use runtime_relay_endpoint::{api_http_warp, observability::Metrics, settings::Settings, App};
use runtime_relay_monitor::http_client::HttpRelayClient;
use runtime_relay_storage::{in_memory::InMemoryMessageStore, message_store::MessageStore};
use tokio::task::JoinHandle;

pub struct RemoteFixture {
    pub app: Arc<App>,
    pub addr: SocketAddr,
    pub store: Arc<InMemoryMessageStore>,
    pub shutdown_requests: Arc<AtomicUsize>,
    server: JoinHandle<()>,
}

impl RemoteFixture {
    /// Starts an endpoint serving the given logical key to topic name mapping. The topics
    /// are created empty. A shutdown request stops the server.
    pub fn start(topics: &[(&str, &str)], chunk_size: usize) -> Self {
        let mut settings = Settings::default();
        settings.server.port = 0;
        settings.relay.chunk_size = chunk_size;
        settings.topics = topics
            .iter()
            .map(|(key, topic)| (key.to_string(), topic.to_string()))
            .collect::<BTreeMap<_, _>>();

        let store = Arc::new(InMemoryMessageStore::new());
        for (_, topic) in topics {
            store.create_topic(topic);
        }

        let stop_signal = Arc::new(AtomicBool::new(false));
        let shutdown_requests = Arc::new(AtomicUsize::new(0));
        let action_signal = stop_signal.clone();
        let action_requests = shutdown_requests.clone();

        let app = Arc::new(App::new(
            settings,
            store.clone(),
            Arc::new(Metrics::disabled()),
            stop_signal,
            Arc::new(move || {
                action_requests.fetch_add(1, Ordering::SeqCst);
                action_signal.store(true, Ordering::Relaxed);
            }),
        ));

        let (addr, server) = api_http_warp::serve(&app, "127.0.0.1:0".parse().unwrap())
            .expect("Failed to bind relay endpoint");
        info!("RemoteFixture: Endpoint listening on {addr}");

        Self {
            app,
            addr,
            store,
            shutdown_requests,
            server: tokio::spawn(server),
        }
    }

    pub fn base_url(self: &Self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(self: &Self, request_timeout: Duration) -> HttpRelayClient {
        HttpRelayClient::new(&self.base_url(), request_timeout, Duration::from_secs(2))
            .expect("Failed to build relay client")
    }

    /// Publishes payloads `<prefix><n>` for n in `from..=to`
    pub fn publish(self: &Self, topic: &str, prefix: &str, from: usize, to: usize) {
        for i in from..=to {
            self.store
                .publish(topic, format!("{prefix}{i}").as_bytes())
                .expect("Failed to publish to remote store");
        }
    }

    pub fn is_stopping(self: &Self) -> bool {
        self.app.stop_signal.load(Ordering::Relaxed)
    }

    /// Waits for the server to finish after its stop signal was set
    pub async fn join(self: Self) -> bool {
        tokio::time::timeout(Duration::from_secs(5), self.server).await.is_ok()
    }

    pub fn stop(self: &Self) {
        self.app.stop_signal.store(true, Ordering::Relaxed);
    }
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
