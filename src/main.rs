//! OCPP gateway entrypoint: wires configuration, observability, the
//! WebSocket listener and the operator REST server together.

use std::future::IntoFuture;
use std::sync::Arc;

use tracing::{error, info};

use voltflow_csms::application::commands::{CommandConfig, CommandManager};
use voltflow_csms::application::events::EventBus;
use voltflow_csms::application::handlers::{build_router, HandlerDeps};
use voltflow_csms::application::registry::StatusRegistry;
use voltflow_csms::application::router::MessageProcessor;
use voltflow_csms::application::transactions::TransactionStore;
use voltflow_csms::config::{default_config_path, AppConfig};
use voltflow_csms::infrastructure::clients::{BillingClient, SessionsClient, TelemetryClient};
use voltflow_csms::infrastructure::persistence::{InMemoryStationRepository, TracingMessageLog};
use voltflow_csms::interfaces::http::{create_api_router, ApiState};
use voltflow_csms::interfaces::ws::OcppServer;
use voltflow_csms::support::shutdown::ShutdownCoordinator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Configuration ──────────────────────────────────────────
    let config_path = std::env::var("OCPP_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => {
            init_tracing(&config.logging.level);
            info!("configuration loaded from {}", config_path.display());
            config
        }
        Err(e) => {
            let config = AppConfig::from_env();
            init_tracing(&config.logging.level);
            info!(error = %e, "no config file, using defaults with env overrides");
            config
        }
    };

    // ── Metrics recorder (before any metrics calls) ────────────
    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("install prometheus recorder: {}", e))?;

    // ── Shared state ───────────────────────────────────────────
    let repository = Arc::new(InMemoryStationRepository::new());
    let registry = Arc::new(StatusRegistry::new());
    let transactions = Arc::new(TransactionStore::new());
    let events = EventBus::shared(config.events.buffer);

    let sessions = Arc::new(SessionsClient::new(config.services.sessions_url.clone()));
    let billing = Arc::new(BillingClient::new(config.services.billing_url.clone()));
    let telemetry = Arc::new(TelemetryClient::new(config.services.telemetry_url.clone()));

    let commands = CommandManager::shared(CommandConfig {
        timeout: config.commands.timeout(),
        max_attempts: config.commands.max_attempts,
        retention: config.commands.retention(),
    });

    let action_router = build_router(&HandlerDeps {
        repository: repository.clone(),
        sessions,
        billing,
        telemetry,
        registry: registry.clone(),
        transactions,
        events: events.clone(),
        heartbeat_interval: config.server.heartbeat_interval,
    });
    let processor = Arc::new(MessageProcessor::new(
        action_router,
        commands.clone(),
        Arc::new(TracingMessageLog),
    ));

    // ── Event drain: keep a log trail of status changes ────────
    spawn_event_logger(events.clone());

    // ── Shutdown plumbing ──────────────────────────────────────
    let shutdown = ShutdownCoordinator::new();
    shutdown.start_signal_listener();
    let shutdown_signal = shutdown.signal();

    // ── Servers ────────────────────────────────────────────────
    let ws_server = OcppServer::new(
        config.websocket.clone(),
        processor,
        commands.clone(),
        events,
        shutdown_signal.clone(),
    );

    let api_router = create_api_router(ApiState {
        commands,
        registry,
        prometheus: Some(prometheus_handle),
    });
    let api_addr = config.server.api_address();
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("operator API listening on http://{}", api_addr);
    info!("swagger UI available at http://{}/docs", api_addr);

    let api_shutdown = shutdown_signal.clone();
    let api_server = axum::serve(api_listener, api_router).with_graceful_shutdown(async move {
        api_shutdown.wait().await;
    });

    let ws_task = tokio::spawn(async move { ws_server.run().await });
    let api_task = tokio::spawn(api_server.into_future());

    tokio::select! {
        result = ws_task => match result {
            Ok(Ok(())) => info!("websocket server stopped"),
            Ok(Err(e)) => error!(error = %e, "websocket server failed"),
            Err(e) => error!(error = %e, "websocket server task panicked"),
        },
        result = api_task => match result {
            Ok(Ok(())) => info!("operator API stopped"),
            Ok(Err(e)) => error!(error = %e, "operator API failed"),
            Err(e) => error!(error = %e, "operator API task panicked"),
        },
    }

    info!("gateway shutdown complete");
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

/// Mirror status and lifecycle events into the log, the way an operator
/// tail-follows the gateway.
fn spawn_event_logger(events: voltflow_csms::application::events::SharedEventBus) {
    use voltflow_csms::application::events::Event;

    let mut subscriber = events.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            match event {
                Event::StationConnected { station_id, remote_addr, .. } => {
                    info!(
                        station_id = station_id.as_str(),
                        remote_addr = remote_addr.as_deref().unwrap_or(""),
                        "event: station connected"
                    );
                }
                Event::StationDisconnected { station_id, .. } => {
                    info!(station_id = station_id.as_str(), "event: station disconnected");
                }
                Event::ConnectorStatusChanged(status) => {
                    info!(
                        station_id = status.station_id.as_str(),
                        evse_id = status.update.evse_id,
                        connector_id = status.update.connector_id,
                        status = status.current.status.as_str(),
                        previous = status.previous.status.as_str(),
                        "event: connector status"
                    );
                }
            }
        }
    });
}
