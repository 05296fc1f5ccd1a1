use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webpilot_browser::sidecar::{SidecarApi, SidecarExecutor, SidecarLauncher};
use webpilot_browser::{BrowserConfig, BrowserManager};
use webpilot_events::{CallbackDelivery, DeliveryConfig, FileOverflowStore, JobEventBus};
use webpilot_worker::{BackendCredentials, BackendRegistry, WorkerDeps};

use webpilot_api::config::ServerConfig;
use webpilot_api::engine::dispatcher::JobDispatcher;
use webpilot_api::engine::tracker::JobTracker;
use webpilot_api::router::build_app_router;
use webpilot_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webpilot_api=debug,webpilot_worker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let browser_config = BrowserConfig::from_env();
    let delivery_config = DeliveryConfig::from_env();
    let credentials = BackendCredentials::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        sidecar_url = %browser_config.sidecar_url,
        openai_configured = credentials.openai_api_key.is_some(),
        gemini_configured = credentials.gemini_api_key.is_some(),
        "Loaded server configuration",
    );

    // --- Shared browser ---
    let sidecar = SidecarApi::new(browser_config.sidecar_url.clone());
    let browser = BrowserManager::start(&SidecarLauncher::new(sidecar.clone()), &browser_config)
        .await
        .expect("Failed to launch shared browser");

    // --- Event bus ---
    let event_bus = Arc::new(JobEventBus::default());
    let log_sink_handle = tokio::spawn(webpilot_events::bus::run_log_sink(event_bus.subscribe()));

    let tracker = Arc::new(JobTracker::new());
    let tracker_handle = tokio::spawn(Arc::clone(&tracker).run(event_bus.subscribe()));

    let prune_cancel = CancellationToken::new();
    let pruner_handle = tokio::spawn(Arc::clone(&tracker).run_pruner(
        Duration::from_secs(config.job_retention_secs),
        prune_cancel.clone(),
    ));
    tracing::info!("Event services started (log sink, job tracker, pruner)");

    // --- Callback delivery ---
    let mut delivery =
        CallbackDelivery::new(&delivery_config).expect("Failed to build callback HTTP client");
    let overflow = delivery_config.overflow_path.as_ref().map(|path| {
        tracing::info!(path = %path.display(), "Callback overflow store enabled");
        Arc::new(FileOverflowStore::new(path.clone()))
    });
    if let Some(store) = &overflow {
        delivery = delivery.with_overflow(store.clone());
    }
    let delivery = Arc::new(delivery);

    // Results parked by a previous run. An interrupted replay resumes at the
    // next startup.
    let replay_handle = overflow.map(|store| {
        let delivery = Arc::clone(&delivery);
        tokio::spawn(async move {
            if let Err(e) = delivery.replay_parked(&store).await {
                tracing::error!(error = %e, "Overflow replay failed");
            }
        })
    });

    // --- Dispatcher ---
    let deps = WorkerDeps {
        browser: Arc::clone(&browser),
        executor: Arc::new(SidecarExecutor::new(sidecar)),
        registry: Arc::new(BackendRegistry::standard(&credentials)),
        delivery,
        events: Arc::clone(&event_bus),
    };
    let dispatcher = Arc::new(JobDispatcher::new(deps, Arc::clone(&tracker)));

    // --- App state ---
    let state = AppState {
        browser: Arc::clone(&browser),
        dispatcher: Arc::clone(&dispatcher),
        tracker,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Drain jobs first; they still hold browser contexts.
    dispatcher
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    if let Some(handle) = replay_handle {
        handle.abort();
    }

    if let Err(e) = browser.shutdown().await {
        tracing::error!(error = %e, "Shared browser did not close cleanly");
    }

    prune_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), pruner_handle).await;

    // Dropping the last bus handles ends the tracker and log sink.
    drop(dispatcher);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), tracker_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), log_sink_handle).await;
    tracing::info!("Event services shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
