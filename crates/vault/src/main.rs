//! `image-vault`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing + optional OTLP).
//! 3. Prepare the storage root, envelope key, and access-key guard.
//! 4. Build the admission limiter and, if configured, its idle sweep.
//! 5. Connect the optional MySQL image index.
//! 6. Build the Axum router and serve HTTP or HTTPS until a shutdown signal.

mod auth;
mod config;
mod crypto;
mod index;
mod limiter;
mod server;
mod storage;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use auth::AccessGuard;
use config::Config;
use crypto::EnvelopeKey;
use index::{ImageIndex, MySqlIndex};
use limiter::{AdmissionLimiter, Clock, MonotonicClock};
use server::state::AppState;
use storage::ImageStore;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.listen_port,
        tls = cfg.tls_paths().is_some(),
        "image-vault starting"
    );

    let result = run(cfg).await;
    if let Err(e) = &result {
        let reason = format!("{e:#}");
        error!(error = %reason, "image-vault stopped with an error");
    }
    telemetry::shutdown_telemetry();
    result
}

async fn run(cfg: Config) -> Result<()> {
    // -----------------------------------------------------------------------
    // 3. Storage and secrets
    // -----------------------------------------------------------------------
    let store = ImageStore::new(&cfg.storage_path);
    store
        .ensure_root()
        .await
        .with_context(|| format!("failed to create storage root {}", cfg.storage_path))?;

    let key = EnvelopeKey::from_password(&cfg.password).context("invalid WISS_PASSWORD")?;
    info!(bits = key.bits(), "envelope key ready");
    let guard = AccessGuard::new(&cfg.access_key);

    // -----------------------------------------------------------------------
    // 4. Admission limiter
    // -----------------------------------------------------------------------
    let shutdown = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let limiter = AdmissionLimiter::new(cfg.rate_limit_requests, cfg.rate_limit_window());
    info!(
        max_requests = limiter.max_requests(),
        window_secs = limiter.window().as_secs(),
        "admission limiter ready"
    );
    let _sweep = cfg.rate_limit_sweep_interval().map(|interval| {
        info!(interval_secs = interval.as_secs(), "idle-client sweep enabled");
        limiter::sweep_task(limiter.clone(), clock.clone(), interval, shutdown.clone())
    });

    // -----------------------------------------------------------------------
    // 5. Image index
    // -----------------------------------------------------------------------
    let index: Option<Arc<dyn ImageIndex>> = match cfg.database_url.as_deref() {
        Some(url) => {
            let index = MySqlIndex::connect_lazy(url).context("invalid WISS_DATABASE_URL")?;
            if let Err(e) = index.ping().await {
                warn!(error = %e, "image index unreachable at startup; ratio sampling will fail until it recovers");
            }
            Some(Arc::new(index) as Arc<dyn ImageIndex>)
        }
        None => {
            info!("no image index configured; ratio sampling disabled");
            None
        }
    };

    // -----------------------------------------------------------------------
    // 6. HTTP(S) server
    // -----------------------------------------------------------------------
    let state = AppState::new(store, key, guard, limiter, clock, index);
    let router = server::router::build(state, cfg.max_upload_bytes);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    match cfg.tls_paths() {
        Some((cert, key)) => {
            let tls = server::tls::load_server_config(cert, key)?;
            server::tls::serve_tls(listener, router, tls, shutdown).await?;
        }
        None => {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("HTTP server failed")?;
        }
    }

    info!("image-vault stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
