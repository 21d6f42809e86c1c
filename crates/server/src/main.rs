//! Livepoll server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use livepoll_api::{AppState, router};
use livepoll_common::Config;
use livepoll_core::{AdmissionGate, BroadcastHub, PollRegistry, TallyService, TallySnapshot};
use livepoll_store::{MemoryStore, SharedPollStore};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Reopen tallies and stream channels for every active poll after the
/// counters were rebuilt from durable vote records.
async fn reopen_live_channels(
    store: &SharedPollStore,
    tally: &TallyService,
    hub: &BroadcastHub,
) -> anyhow::Result<()> {
    for poll in store.list_active_polls().await? {
        let options = store.get_options(&poll.id).await?;
        let counts = tally.get_tally(&poll.id).await?;
        hub.register(&poll.id, TallySnapshot::assemble(&poll, &options, &counts))
            .await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livepoll=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting livepoll server...");

    // Load configuration
    let config = Config::load()?;

    // Initialize the storage collaborator
    let store: SharedPollStore = Arc::new(MemoryStore::new());

    // Initialize services
    let tally = TallyService::new();
    let hub = BroadcastHub::new();
    let registry = PollRegistry::new(Arc::clone(&store), tally.clone(), hub.clone());
    let admission = AdmissionGate::new(
        Arc::clone(&store),
        tally.clone(),
        hub.clone(),
        config.storage.timeout(),
    );

    // Recovery: tallies are recounted from durable vote records, never
    // trusted across restarts.
    info!("Rebuilding tallies from durable vote records...");
    tally.rebuild(&store).await?;
    reopen_live_channels(&store, &tally, &hub).await?;
    info!("Tally rebuild completed");

    // Create app state
    let state = AppState {
        registry,
        admission,
        tally,
        hub,
        stream_keep_alive: config.stream.keep_alive(),
    };

    // Build router
    let app = router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses feed the voter fingerprint, so the app is served with
    // connect info attached.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}
