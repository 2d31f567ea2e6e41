//! FormGate server binary.

use anyhow::Context;
use formgate_core::clock::SystemClock;
use formgate_core::intake::IntakePipeline;
use formgate_core::ratelimit::{spawn_sweeper, Quota, RateLimiter, RatePurpose};
use formgate_postgres::{PgAuditSink, PgStore};
use formgate_server::{build_router, AppState, Config};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let store = PgStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("connecting to postgres")?;
    let pool = store.pool().clone();
    tracing::info!("database connected and migrated");

    let clock = Arc::new(SystemClock);
    let limiter = Arc::new(RateLimiter::new(clock.clone()).with_quota(
        RatePurpose::PublicSubmission,
        Quota {
            max: config.submission_rate_max,
            window: config.submission_rate_window,
        },
    ));
    let sweeper = spawn_sweeper(Arc::clone(&limiter), config.rate_sweep_interval);

    let catalog = Arc::new(store.clone());
    let ledger = Arc::new(store.clone());
    let submissions = Arc::new(store);
    let audit = Arc::new(PgAuditSink::new(pool.clone()));

    let pipeline = Arc::new(IntakePipeline::new(
        catalog.clone(),
        ledger.clone(),
        submissions.clone(),
        audit.clone(),
        Arc::clone(&limiter),
        clock.clone(),
    ));

    let state = AppState {
        pipeline,
        catalog,
        ledger,
        submissions,
        audit,
        limiter,
        clock,
        db: Some(pool),
    };

    let router = build_router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "formgate server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
