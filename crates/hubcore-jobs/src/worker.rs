//! Worker pool: polls the job queue for ready work across all registered
//! kinds and dispatches each leased job to its handler, with exponential
//! backoff on failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hubcore_db::JobRepository;
use tracing::{error, info, warn};

use crate::backoff::{calculate_delay, BackoffPolicy};
use crate::handlers::{ci, kind, mirror, search, webhook};

pub struct JobContext {
    pub jobs: JobRepository,
    pub store: hubcore_storage::RepoStore,
    pub http: reqwest::Client,
    pub lease_duration_secs: i64,
    pub backoff: BackoffPolicy,
}

async fn dispatch(ctx: &JobContext, job_kind: &str, payload: serde_json::Value) -> crate::error::Result<()> {
    match job_kind {
        kind::WEBHOOK_DELIVER => webhook::handle(&ctx.http, payload).await,
        kind::SEARCH_INDEX => search::handle(&ctx.http, payload).await,
        kind::CI_TRIGGER => ci::handle(&ctx.http, payload).await,
        kind::REPO_IMPORT => mirror::handle_import(&ctx.store, payload).await,
        kind::REPO_EXPORT => mirror::handle_export(&ctx.store, payload).await,
        kind::REPO_PURGE => mirror::handle_purge(&ctx.store, payload).await,
        other => Err(crate::error::Error::UnknownKind(other.to_string())),
    }
}

/// Run one polling pass over `kinds`, leasing and executing at most one job
/// per kind. Returns the number of jobs it actually processed, so the
/// caller can back off its own poll interval when the queue is empty.
pub async fn poll_once(ctx: &JobContext, kinds: &[&str]) -> crate::error::Result<usize> {
    let mut processed = 0;

    for &job_kind in kinds {
        let Some((job, lease_token)) = ctx.jobs.lease_next(job_kind, ctx.lease_duration_secs).await? else {
            continue;
        };
        processed += 1;

        info!(job_id = %job.id, kind = job_kind, attempt = job.attempts, "leased job");

        match dispatch(ctx, job_kind, job.payload.clone()).await {
            Ok(()) => {
                ctx.jobs.complete(job.id, lease_token).await?;
                info!(job_id = %job.id, kind = job_kind, "job succeeded");
            }
            Err(e) if e.is_permanent() => {
                warn!(job_id = %job.id, kind = job_kind, error = %e, "job failed permanently, dead-lettering");
                ctx.jobs.kill(job.id, lease_token, &e.to_string()).await?;
            }
            Err(e) => {
                let delay = calculate_delay(&ctx.backoff, job.attempts as u32);
                let retry_after = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
                warn!(job_id = %job.id, kind = job_kind, attempts = job.attempts, error = %e, "job failed, rescheduling");
                ctx.jobs.fail(job.id, lease_token, &e.to_string(), retry_after).await?;
            }
        }
    }

    Ok(processed)
}

/// Drive [`poll_once`] forever, sleeping `idle_interval` whenever a pass
/// finds nothing to do. Intended to be spawned as a long-lived tokio task;
/// one instance is enough for all kinds since dispatch is IO-bound and
/// leasing already serializes correctly under `FOR UPDATE SKIP LOCKED`.
pub async fn run_forever(ctx: Arc<JobContext>, kinds: Vec<&'static str>, idle_interval: Duration) {
    loop {
        match poll_once(&ctx, &kinds).await {
            Ok(0) => tokio::time::sleep(idle_interval).await,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "job poll pass failed");
                tokio::time::sleep(idle_interval).await;
            }
        }
    }
}

/// Periodically reclaim jobs whose workers died mid-lease. Run as its own
/// background task alongside [`run_forever`].
pub async fn run_lease_reaper(jobs: JobRepository, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        match jobs.reclaim_expired_leases().await {
            Ok(0) => {}
            Ok(n) => info!(count = n, "reclaimed expired job leases"),
            Err(e) => error!(error = %e, "lease reclaim pass failed"),
        }
    }
}
