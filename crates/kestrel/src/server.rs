//! Host HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use kestrel_gateway::Gateway;
use kestrel_telemetry::{log_listening, log_shutdown, MetricsRegistry};
use tokio::net::TcpListener;

use crate::api::{create_router, AppState};
use crate::audit::MetricsAudit;
use crate::config::KestrelConfig;
use crate::host::InMemoryHost;

/// Build the gateway, load configured plugins, and assemble router state.
pub fn build_state(
    config: &KestrelConfig,
    metrics: Arc<MetricsRegistry>,
) -> anyhow::Result<AppState> {
    let host = InMemoryHost::new();
    for (id, points) in &config.series {
        host.series.insert(id.clone(), points.clone());
    }
    if !config.series.is_empty() {
        tracing::info!(count = config.series.len(), "metric series seeded");
    }
    let audit = Arc::new(MetricsAudit::new(metrics.clone()));
    let gateway = Gateway::new(
        host.services(),
        config.batch.clone(),
        config.http_rate,
        audit,
    )
    .context("failed to build gateway")?;

    if let Some(dir) = &config.plugins_dir {
        let loaded = gateway
            .load_dir(dir)
            .with_context(|| format!("failed to load plugins from {}", dir.display()))?;
        tracing::info!(count = loaded.len(), dir = %dir.display(), "plugins loaded");
    }

    Ok(AppState {
        gateway: Arc::new(gateway),
        metrics,
        host,
        channel_capacity: config.channel_capacity,
        started_at: Utc::now(),
    })
}

/// Run the host until interrupted.
pub async fn run(config: KestrelConfig, metrics: Arc<MetricsRegistry>) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.listen))?;

    let state = build_state(&config, metrics)?;
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    log_listening!(addr = %addr, "kestrel listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_shutdown!("kestrel stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
