//! Process entry point: loads configuration, wires the metadata store and
//! write pipeline, reconciles on-disk state with the database, then runs
//! the Smart HTTP server, the optional SSH listener, the job worker pool,
//! the lease reaper, and the outbox relay side by side until asked to
//! shut down.

mod concurrency;
mod http;
mod ssh;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hubcore_config::{Config, LogFormat};
use hubcore_db::create_pool;
use hubcore_jobs::handlers::kind;
use hubcore_jobs::relay::{RelayContext, RelayTargets};
use hubcore_jobs::worker::JobContext;
use hubcore_jobs::{run_forever, run_lease_reaper, run_relay_forever};
use hubcore_pipeline::{reconcile_all, PipelineContext};
use hubcore_storage::RepoStore;

use crate::state::AppState;

fn setup_tracing(config: &hubcore_config::LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.rust_log.clone()));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    setup_tracing(&config.logging);

    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    let storage = RepoStore::new(config.storage.repository_path.clone());

    let pipeline_ctx = PipelineContext::new(
        storage.clone(),
        pool.clone(),
        config.webhook.hmac_secret_default.clone(),
    );

    tracing::info!("reconciling repository metadata against on-disk state");
    let outcomes = reconcile_all(&pipeline_ctx).await?;
    let rewritten: usize = outcomes.iter().map(|o| o.refs_rewritten).sum();
    tracing::info!(repositories = outcomes.len(), refs_rewritten = rewritten, "reconciliation complete");

    let app_state = AppState::new(config.clone(), pool.clone(), storage.clone(), pipeline_ctx);

    let job_ctx = Arc::new(JobContext {
        jobs: hubcore_db::JobRepository::new(pool.clone()),
        store: storage.clone(),
        http: reqwest::Client::new(),
        lease_duration_secs: (config.jobs.lease_duration_ms / 1_000).max(1) as i64,
        backoff: hubcore_jobs::backoff::BackoffPolicy::with_base_delay_ms(config.jobs.base_backoff_ms),
    });

    let worker_kinds: &[&str] = &[
        kind::WEBHOOK_DELIVER,
        kind::SEARCH_INDEX,
        kind::CI_TRIGGER,
        kind::REPO_IMPORT,
        kind::REPO_EXPORT,
        kind::REPO_PURGE,
    ];
    let idle_interval = std::time::Duration::from_millis(500);
    // One pool per kind, sized from `jobs.pool_sizes.<kind>` (falling back
    // to `jobs.default_pool_size`), each polling only its own kind so a
    // slow handler in one pool never starves another kind's workers.
    let mut worker_handles = Vec::new();
    for &job_kind in worker_kinds {
        let pool_size = config.jobs.pool_size(job_kind).max(1);
        tracing::info!(kind = job_kind, pool_size, "starting worker pool");
        for _ in 0..pool_size {
            worker_handles.push(tokio::spawn(run_forever(job_ctx.clone(), vec![job_kind], idle_interval)));
        }
    }

    let reaper_handle = tokio::spawn(run_lease_reaper(
        hubcore_db::JobRepository::new(pool.clone()),
        std::time::Duration::from_millis(config.jobs.lease_duration_ms),
    ));

    let relay_ctx = Arc::new(RelayContext {
        outbox: hubcore_db::OutboxRepository::new(pool.clone()),
        repos: hubcore_db::RepoRepository::new(pool.clone()),
        jobs: hubcore_db::JobRepository::new(pool.clone()),
        targets: RelayTargets {
            search_index_url: config.relay.search_index_url.clone(),
            ci_trigger_url: config.relay.ci_trigger_url.clone(),
            webhook_hmac_secret_default: config.webhook.hmac_secret_default.clone().into(),
        },
        batch_size: 100,
        default_max_attempts: config.jobs.max_attempts as i32,
    });
    let relay_handle = tokio::spawn(run_relay_forever(
        relay_ctx,
        std::time::Duration::from_millis(config.relay.idle_interval_ms),
    ));

    let ssh_handle = if config.ssh.enabled {
        let ssh_state = app_state.clone();
        let port = config.ssh.port;
        let host_key_path = config.ssh.host_key_path.clone();
        Some(tokio::spawn(async move {
            if let Err(err) = ssh::serve(ssh_state, port, &host_key_path).await {
                tracing::error!(error = %err, "ssh server exited");
            }
        }))
    } else {
        None
    };

    let router = http::router(app_state).into_make_service_with_connect_info::<std::net::SocketAddr>();
    let listener = tokio::net::TcpListener::bind(&config.http.bind_address).await?;
    tracing::info!(address = %config.http.bind_address, "smart http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in worker_handles {
        handle.abort();
    }
    reaper_handle.abort();
    relay_handle.abort();
    if let Some(h) = ssh_handle {
        h.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
    tracing::info!("shutdown signal received, draining in-flight requests");
}
