//! Process entry point: loads configuration, opens the dataset, and serves
//! the HTTP/WebSocket control and streaming surface (§5, §6).

mod config;
mod error;
mod http;
mod metrics;
mod state;
mod streaming;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use neurastream_core::{NoiseConfig, SessionManager};
use neurastream_dataset::BinaryDataset;
use neurastream_lsl::LslConfig;

use config::Settings;
use state::AppState;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    if let Err(err) = run().await {
        error!("neurastream-server exited with an error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> error::Result<()> {
    let settings = Settings::load()?;

    let dataset_path = settings.dataset_path();
    info!("opening dataset at {}", dataset_path.display());
    let dataset: Arc<dyn neurastream_dataset::Dataset> =
        Arc::new(BinaryDataset::open(&dataset_path)?);

    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&dataset),
        settings.max_connections,
        settings.session_ttl,
    ));

    let lsl_config = LslConfig {
        stream_name: settings.lsl_stream_name.clone(),
        stream_type: settings.lsl_stream_type.clone(),
        source_id: settings.lsl_source_id.clone(),
        num_channels: dataset.num_channels(),
    };
    let side_publisher = neurastream_lsl::build_publisher(settings.lsl_enabled, lsl_config);

    let noise_config = settings.noise_injection_enabled.then(|| NoiseConfig {
        noise_std: settings.noise_std,
        drift_amplitude: settings.drift_amplitude,
        drift_period_s: settings.drift_period_seconds,
        noise_enabled: true,
        drift_enabled: true,
    });

    let bind_addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState {
        dataset,
        sessions: Arc::clone(&sessions),
        side_publisher,
        settings: Arc::new(settings),
        noise_config,
        started_at: Instant::now(),
    };

    tokio::spawn(cleanup_task(Arc::clone(&sessions)));

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let streaming_router = Router::new()
        .route("/stream/:code", get(streaming::stream_json))
        .route("/stream/binary/:code", get(streaming::stream_binary))
        .with_state(state.clone());

    let app = http::router(state).merge(streaming_router).layer(middleware);

    info!("listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::ApiError::config(format!("failed to bind {bind_addr}: {err}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::ApiError::config(format!("server error: {err}")))?;

    Ok(())
}

/// Periodically evict idle-expired sessions (§4.4).
async fn cleanup_task(sessions: Arc<SessionManager>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let removed = sessions.cleanup_expired();
        if removed > 0 {
            info!("cleanup task evicted {removed} expired session(s)");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("shutdown signal received, draining connections");
}
