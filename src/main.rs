use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pr_watch::config::{Settings, WatchConfig};
use pr_watch::github::OctocrabClient;
use pr_watch::interest::OwnershipCache;
use pr_watch::lifecycle::Tracker;
use pr_watch::notify::{LoggingNotifier, NotificationSink, OutboxNotifier, ToggledNotifier};
use pr_watch::reconcile::{PollConfig, ReconcileService, Reconciler};
use pr_watch::server::{AppState, build_router};
use pr_watch::store::{MemoryStore, SNAPSHOT_FILE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pr_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::load().context("loading configuration")?;
    let settings = Settings::from_env().context("reading environment")?;
    info!(repo = %config.repo, ?settings, "Starting PR watcher");

    let host = OctocrabClient::from_token(settings.github_token.clone(), config.repo.clone())
        .context("building GitHub client")?
        .with_request_timeout(config.request_timeout);

    let snapshot_path = settings.state_dir.join(SNAPSHOT_FILE);
    let store = Arc::new(
        MemoryStore::open(&snapshot_path)
            .with_context(|| format!("opening store at {}", snapshot_path.display()))?,
    );

    let sink = match &settings.outbox_path {
        Some(path) => NotificationSink::Outbox(
            OutboxNotifier::open(path, config.notifications.email_to.clone())
                .with_context(|| format!("opening outbox {}", path.display()))?,
        ),
        None => {
            warn!("PR_WATCH_OUTBOX not set, notifications are only logged");
            NotificationSink::Log(LoggingNotifier)
        }
    };
    let notifier = ToggledNotifier::new(sink, config.notifications.clone());

    let tracker = Arc::new(Tracker::new(
        host,
        store.clone(),
        notifier,
        OwnershipCache::new(config.default_branch.clone()),
        config.interests.clone(),
    ));

    let shutdown = CancellationToken::new();
    let poll = PollConfig::from_config(&config);
    let interval = poll.interval;
    let reconcile = ReconcileService::start_with_token(
        Reconciler::new(Arc::clone(&tracker), poll),
        interval,
        shutdown.clone(),
    );

    let app = build_router(AppState::new(
        tracker,
        config.repo.clone(),
        settings.webhook_secret.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(settings.listen_addr)
        .await
        .with_context(|| format!("binding {}", settings.listen_addr))?;
    info!("listening on {}", settings.listen_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .context("serving HTTP")?;

    reconcile.shutdown().await;
    tokio::task::spawn_blocking(move || store.flush())
        .await
        .context("joining store flush")?
        .context("flushing store")?;
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
