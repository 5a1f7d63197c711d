use std::{
    env,
    net::{IpAddr, SocketAddr},
    process::ExitCode,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{error, info, LevelFilter};
use tokio::task;

use runtime_relay_endpoint::{
    api_http_warp, observability::Metrics, services::shutdown_service::ShutdownAction,
    settings::Settings, topics::TopicResolver, App,
};
use runtime_relay_storage::in_memory::InMemoryMessageStore;

#[tokio::main]
async fn main() -> ExitCode {
    let mut clog = colog::default_builder();

    #[cfg(debug_assertions)]
    clog.filter_level(LevelFilter::Debug);

    #[cfg(not(debug_assertions))]
    clog.filter_level(LevelFilter::Info);

    clog.init();

    // 1st command line arg is the name of the environment
    let args: Vec<String> = env::args().collect();
    let environment = args.get(1).map(String::as_str).unwrap_or("dev");

    // Merge configuration sources for this environment
    let settings = match Settings::load(environment) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Endpoint: Invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let ip_address = match IpAddr::from_str(&settings.server.ip_address) {
        Ok(ip_address) => ip_address,
        Err(err) => {
            error!("Endpoint: Failed to parse {} as an IP address: {err}", settings.server.ip_address);
            return ExitCode::FAILURE;
        }
    };
    let addr = SocketAddr::new(ip_address, settings.server.port);

    // The program this endpoint runs beside publishes into this store
    let store = Arc::new(InMemoryMessageStore::new());
    let resolver = TopicResolver::new(settings.topics.clone());
    for topic in resolver.topic_names() {
        store.create_topic(topic);
    }

    // In debug builds put some messages in each topic so there is something to relay
    #[cfg(debug_assertions)]
    publish_samples(&store, &resolver);

    let stop_signal = Arc::new(AtomicBool::new(false));

    // A shutdown request from the monitor stops this process the same way SIGTERM does
    let shutdown_signal = stop_signal.clone();
    let shutdown_action: ShutdownAction = Arc::new(move || {
        info!("Endpoint: Shutdown requested by the monitor");
        shutdown_signal.store(true, Ordering::Relaxed);
    });

    let metrics = Arc::new(Metrics::new(&settings.metrics));
    let app = Arc::new(App::new(settings, store, metrics.clone(), stop_signal.clone(), shutdown_action));

    // Handle SIGTERM by setting the stop_signal boolean
    let ctrlc_signal = stop_signal.clone();
    if let Err(err) = ctrlc::set_handler(move || ctrlc_signal.store(true, Ordering::Relaxed)) {
        error!("Endpoint: Failed to install signal handler: {err}");
        return ExitCode::FAILURE;
    }

    let metrics_signal = stop_signal.clone();
    task::spawn(async move { metrics.run(&metrics_signal).await });

    match api_http_warp::serve(&app, addr) {
        Ok((_addr, server)) => {
            server.await;
            info!("Endpoint: Stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Endpoint: Failed to bind {addr}: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(debug_assertions)]
fn publish_samples(store: &InMemoryMessageStore, resolver: &TopicResolver) {
    use runtime_relay_storage::message_store::MessageStore;

    for topic in resolver.topic_names() {
        for i in 1..=5 {
            let payload = format!("{{\"sample\":{i},\"topic\":\"{topic}\"}}");
            if let Err(err) = store.publish(topic, payload.as_bytes()) {
                error!("Endpoint: Failed to publish sample message: {err}");
            }
        }
    }
}
