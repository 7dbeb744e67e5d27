//! Outbox relay: drains `outbox_events` rows the write pipeline committed
//! and translates each one into the job-queue rows its downstream
//! consumers actually run on. This is the seam between the transactional
//! outbox (one commit per push, domain-shaped) and the job queue (one row
//! per unit of retryable work, delivery-shaped) — a push touching three
//! refs with a webhook configured becomes one `webhook.deliver` job plus
//! one `search.index`/`ci.trigger` pair per ref, not a single fan-out job,
//! so a slow CI endpoint can't stall the webhook or vice versa.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use hubcore_db::{OutboxEvent, OutboxRepository, RepoRepository};

use crate::handlers::kind;
use crate::handlers::webhook::delivery_id_for;
use crate::error::Result;

/// Where the relay sends `search.index` and `ci.trigger` jobs. Unlike
/// webhooks, these targets aren't per-repository configuration — they're
/// the one search indexer and one CI system this deployment runs.
/// `None` means the consumer isn't wired up; matching events are simply
/// not enqueued for it.
#[derive(Debug, Clone, Default)]
pub struct RelayTargets {
    pub search_index_url: Option<String>,
    pub ci_trigger_url: Option<String>,
    pub webhook_hmac_secret_default: Arc<str>,
}

pub struct RelayContext {
    pub outbox: OutboxRepository,
    pub repos: RepoRepository,
    pub jobs: hubcore_db::JobRepository,
    pub targets: RelayTargets,
    pub batch_size: i64,
    /// `jobs.max_attempts` from configuration, stamped onto every job this
    /// relay enqueues.
    pub default_max_attempts: i32,
}

/// One relay pass: fetch unpublished events, enqueue their derived jobs,
/// mark them published. Marking happens only after every derived job for
/// the batch is durably enqueued, so a crash mid-batch just means the same
/// events get relayed again next pass — enqueuing a job is idempotent
/// enough for at-least-once delivery (the handlers themselves are the ones
/// that must tolerate a duplicate delivery).
pub async fn relay_once(ctx: &RelayContext) -> Result<usize> {
    let events = ctx.outbox.fetch_unpublished(ctx.batch_size).await?;
    if events.is_empty() {
        return Ok(0);
    }

    let mut published = Vec::with_capacity(events.len());
    for event in &events {
        match enqueue_for_event(ctx, event).await {
            Ok(n) => {
                info!(event_id = %event.id, event_type = %event.event_type, jobs_enqueued = n, "relayed outbox event");
                published.push(event.id);
            }
            Err(e) => {
                // Leave unpublished; it's picked up again next pass. An
                // event that can never be translated (e.g. a payload shape
                // from a since-removed event type) would otherwise wedge
                // the whole batch behind it, but `fetch_unpublished` orders
                // by `created_at`, so skipping forward here would break
                // delivery order for this repository's later events too.
                error!(event_id = %event.id, event_type = %event.event_type, error = %e, "failed to relay outbox event, will retry");
            }
        }
    }

    if !published.is_empty() {
        ctx.outbox.mark_published(&published).await?;
    }
    Ok(published.len())
}

async fn enqueue_for_event(ctx: &RelayContext, event: &OutboxEvent) -> Result<usize> {
    match event.event_type.as_str() {
        "repository.pushed" => enqueue_for_push(ctx, event).await,
        "repository.deleted" => enqueue_for_deletion(ctx, event).await,
        other => {
            // Unknown event type: nothing downstream currently consumes
            // it. Treat as relayed rather than retrying forever.
            tracing::debug!(event_type = other, "no relay mapping for event type, dropping");
            Ok(0)
        }
    }
}

async fn enqueue_for_push(ctx: &RelayContext, event: &OutboxEvent) -> Result<usize> {
    let repository_id = match event.repository_id {
        Some(id) => id,
        None => return Ok(0),
    };
    let updates = event.payload.get("updates").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    let mut enqueued = 0;

    if let Some(repo) = ctx.repos.get_by_id(repository_id).await? {
        if let Some(webhook_url) = repo.webhook_url.as_deref() {
            let body = json!({
                "repository_id": repository_id,
                "pusher_principal_id": event.payload.get("pusher_principal_id"),
                "updates": updates,
            });
            let delivery_id = delivery_id_for(event.id, webhook_url);
            ctx.jobs
                .enqueue(
                    Uuid::new_v4(),
                    kind::WEBHOOK_DELIVER,
                    json!({
                        "url": webhook_url,
                        "secret": ctx.targets.webhook_hmac_secret_default.as_ref(),
                        "event_type": event.event_type,
                        "body": body,
                        "delivery_id": delivery_id,
                    }),
                    Utc::now(),
                    ctx.default_max_attempts,
                )
                .await?;
            enqueued += 1;
        }
    }

    for update in &updates {
        let (Some(ref_name), Some(new_oid)) = (
            update.get("ref_name").and_then(|v| v.as_str()),
            update.get("new_oid").and_then(|v| v.as_str()),
        ) else {
            continue;
        };
        // A deleted ref has no tree to index or build; only live refs get
        // a search/CI job.
        const ZERO_OID: &str = "0000000000000000000000000000000000000000";
        if new_oid == ZERO_OID {
            continue;
        }

        if let Some(index_url) = &ctx.targets.search_index_url {
            ctx.jobs
                .enqueue(
                    Uuid::new_v4(),
                    kind::SEARCH_INDEX,
                    json!({
                        "index_url": index_url,
                        "repository_id": repository_id,
                        "ref_name": ref_name,
                        "commit_oid": new_oid,
                    }),
                    Utc::now(),
                    ctx.default_max_attempts,
                )
                .await?;
            enqueued += 1;
        }

        if let Some(ci_url) = &ctx.targets.ci_trigger_url {
            ctx.jobs
                .enqueue(
                    Uuid::new_v4(),
                    kind::CI_TRIGGER,
                    json!({
                        "ci_url": ci_url,
                        "repository_id": repository_id,
                        "ref_name": ref_name,
                        "commit_oid": new_oid,
                        "token": serde_json::Value::Null,
                    }),
                    Utc::now(),
                    ctx.default_max_attempts,
                )
                .await?;
            enqueued += 1;
        }
    }

    Ok(enqueued)
}

async fn enqueue_for_deletion(ctx: &RelayContext, event: &OutboxEvent) -> Result<usize> {
    let repository_id = match event.repository_id {
        Some(id) => id,
        None => return Ok(0),
    };
    ctx.jobs
        .enqueue(
            Uuid::new_v4(),
            kind::REPO_PURGE,
            json!({ "repository_id": repository_id }),
            Utc::now(),
            ctx.default_max_attempts,
        )
        .await?;
    Ok(1)
}

/// Drive [`relay_once`] forever, sleeping `idle_interval` whenever a pass
/// finds nothing new. Meant to run as its own long-lived task alongside
/// the job workers, not as one of the job kinds itself — the outbox is a
/// different queue with different ordering guarantees than the job table.
pub async fn run_relay_forever(ctx: Arc<RelayContext>, idle_interval: std::time::Duration) {
    loop {
        match relay_once(&ctx).await {
            Ok(0) => tokio::time::sleep(idle_interval).await,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "outbox relay pass failed");
                tokio::time::sleep(idle_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_targets_default_has_no_consumers_wired() {
        let targets = RelayTargets::default();
        assert!(targets.search_index_url.is_none());
        assert!(targets.ci_trigger_url.is_none());
    }
}
