mod config;

use common::domain::{SystemClock, ZoneDirectory};
use common::telemetry::init_telemetry;
use config::ServiceConfig;
use event_forwarder::{
    EventBus, EventForwarder, HttpDeliveryClient, JsonFileSnapshotStore, JsonFileZoneDirectory,
    JsonLinesEventReader, ZoneResolver,
};
use hearth_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_config = match config.telemetry_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Invalid telemetry configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = init_telemetry(&telemetry_config) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    let forwarder_config = match config.forwarder_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid forwarder configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        endpoint = %forwarder_config.endpoint_url,
        events_path = %config.events_path,
        "Starting hearth forwarder"
    );
    debug!(
        batch_size = forwarder_config.batch_size,
        max_queue_size = forwarder_config.max_queue_size,
        enabled_domains = ?forwarder_config.enabled_domains,
        "Forwarder configuration"
    );

    let directory: Arc<dyn ZoneDirectory> =
        Arc::new(JsonFileZoneDirectory::new(&config.registry_path));
    let zones = match directory.snapshot().await {
        Ok(snapshot) => ZoneResolver::from_registry(&snapshot),
        Err(e) => {
            warn!(
                registry_path = %config.registry_path,
                error = %e,
                "Registry unavailable, envelopes will carry no zones"
            );
            ZoneResolver::default()
        }
    };

    let sink = match HttpDeliveryClient::new(
        &forwarder_config.endpoint_url,
        forwarder_config.api_token.clone(),
        forwarder_config.request_timeout,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create delivery client: {}", e);
            std::process::exit(1);
        }
    };
    let store = Arc::new(JsonFileSnapshotStore::new(&config.state_path));

    let forwarder = match EventForwarder::new(
        forwarder_config,
        zones,
        sink,
        store,
        Arc::new(SystemClock),
    ) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("Failed to create forwarder: {}", e);
            std::process::exit(1);
        }
    };
    forwarder.restore().await;

    let bus = Arc::new(EventBus::new());
    let subscription = forwarder.attach(bus.as_ref());

    let reader = match JsonLinesEventReader::open(&config.events_path, bus).await {
        Ok(reader) => reader,
        Err(e) => {
            error!(events_path = %config.events_path, "Failed to open event stream: {}", e);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new()
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs));

    for (name, process) in forwarder.clone().into_runner_processes(Some(directory)) {
        runner = runner.with_boxed_process(name, process);
    }

    runner = runner.with_named_process("event_reader", move |ctx| async move {
        reader.run(ctx).await.map(|_| ())
    });

    runner = runner.with_closer(move || async move {
        info!("Detaching from event source");
        subscription.unsubscribe();
        forwarder.shutdown().await;
        Ok(())
    });

    let outcome = runner.run().await;
    std::process::exit(outcome.exit_code());
}
