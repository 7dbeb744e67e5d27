//! Dependency wiring for the write pipeline. `hub-server` builds one
//! `PipelineContext` at startup and shares it across requests; per-push
//! state is threaded through the orchestration functions instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use hubcore_auth::CapabilityCache;
use hubcore_db::{AuditRepository, GrantRepository, JobRepository, OutboxRepository, ProtectionRepository, RefRepository, RepoRepository};
use hubcore_storage::RepoStore;

use crate::facts::{NoReviews, ReviewFactsProvider};

/// Everything the write pipeline needs, independent of any one push.
#[derive(Clone)]
pub struct PipelineContext {
    pub storage: Arc<RepoStore>,
    pub pool: PgPool,
    pub repo_repo: Arc<RepoRepository>,
    pub ref_repo: Arc<RefRepository>,
    pub protection_repo: Arc<ProtectionRepository>,
    pub grant_repo: Arc<GrantRepository>,
    pub audit_repo: Arc<AuditRepository>,
    pub job_repo: Arc<JobRepository>,
    pub outbox_repo: Arc<OutboxRepository>,
    pub capability_cache: Arc<CapabilityCache>,
    pub review_facts: Arc<dyn ReviewFactsProvider>,
    pub webhook_hmac_secret_default: Arc<str>,
}

impl PipelineContext {
    pub fn new(storage: RepoStore, pool: PgPool, webhook_hmac_secret_default: impl Into<Arc<str>>) -> Self {
        Self {
            storage: Arc::new(storage),
            repo_repo: Arc::new(RepoRepository::new(pool.clone())),
            ref_repo: Arc::new(RefRepository::new(pool.clone())),
            protection_repo: Arc::new(ProtectionRepository::new(pool.clone())),
            grant_repo: Arc::new(GrantRepository::new(pool.clone())),
            audit_repo: Arc::new(AuditRepository::new(pool.clone())),
            job_repo: Arc::new(JobRepository::new(pool.clone())),
            outbox_repo: Arc::new(OutboxRepository::new(pool.clone())),
            capability_cache: Arc::new(CapabilityCache::new(Duration::from_secs(60))),
            review_facts: Arc::new(NoReviews),
            pool,
            webhook_hmac_secret_default: webhook_hmac_secret_default.into(),
        }
    }

    pub fn with_review_facts(mut self, provider: Arc<dyn ReviewFactsProvider>) -> Self {
        self.review_facts = provider;
        self
    }
}

/// Carries cancellation, a deadline, and a correlation id through a single
/// request, per spec's cancellation-semantics requirement. Front-ends
/// construct one per connection/request; the pipeline checks
/// `cancelled()` between stages rather than mid-stage, since partial
/// application of a single ref update is never sound.
#[derive(Clone)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub deadline: Option<std::time::Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_deadline(mut self, deadline: std::time::Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A clone that shares the same cancellation flag, handed to whatever
    /// watches the transport connection for an early client disconnect.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| std::time::Instant::now() > d)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
