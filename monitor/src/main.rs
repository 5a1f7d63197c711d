use std::{
    env,
    path::Path,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{error, info, LevelFilter};
use tokio::time;

use runtime_relay_monitor::{
    http_client::HttpRelayClient, settings::Settings, MonitorOutcome, RuntimeMonitor,
};
use runtime_relay_storage::{build_offset_store, in_memory::InMemoryMessageStore, PersistenceScheme};

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
            error!("Monitor: Invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let offset_store = match PersistenceScheme::from_string(&settings.offsets.scheme) {
        Ok(scheme) => match build_offset_store(scheme, Path::new(&settings.offsets.path)) {
            Ok(store) => store,
            Err(err) => {
                error!("Monitor: Unable to open offset store: {err}");
                return ExitCode::FAILURE;
            }
        },
        Err(err) => {
            error!("Monitor: {err}");
            return ExitCode::FAILURE;
        }
    };

    let transport = match HttpRelayClient::new(
        &settings.remote.base_url,
        settings.remote.request_timeout(),
        settings.remote.shutdown_timeout(),
    ) {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            error!("Monitor: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Stands in for the control plane's message bus
    let local_store = Arc::new(InMemoryMessageStore::with_auto_create());

    info!("Monitor: Relaying {:?} from {}", settings.relay.topics, transport.base_url());
    let monitor = RuntimeMonitor::new(settings.relay, transport, local_store.clone(), offset_store)
        .with_shutdown_timeout(settings.remote.shutdown_timeout());
    let mut handle = monitor.start();

    // Handle SIGTERM by setting the stop_signal boolean
    let stop_signal = Arc::new(AtomicBool::new(false));
    let ctrlc_signal = stop_signal.clone();
    if let Err(err) = ctrlc::set_handler(move || ctrlc_signal.store(true, Ordering::Relaxed)) {
        error!("Monitor: Failed to install signal handler: {err}");
        handle.stop();
    }

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome,
        _ = stop_requested(&stop_signal) => handle.stop_and_wait().await,
    };

    for topic in local_store.topic_names() {
        info!(
            "Monitor: {topic} received {} messages",
            local_store.message_count(&topic).unwrap_or(0)
        );
    }

    match outcome {
        MonitorOutcome::Stopped => ExitCode::SUCCESS,
        MonitorOutcome::Failed(err) => {
            error!("Monitor: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn stop_requested(stop_signal: &Arc<AtomicBool>) {
    while !stop_signal.load(Ordering::Relaxed) {
        time::sleep(Duration::from_millis(100)).await;
    }
}
