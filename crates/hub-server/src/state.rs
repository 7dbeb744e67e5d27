//! Shared application state: everything a request handler or SSH session
//! needs, built once at startup and cloned (cheaply, via `Arc`) per
//! connection.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use hubcore_auth::{Capability, JwtCodec, LockoutTracker};
use hubcore_config::Config;
use hubcore_db::repository::RepoRecord;
use hubcore_db::{OwnerRepository, PrincipalRepository, SshKeyRepository, TokenRepository};
use hubcore_git::GitEngine;
use hubcore_pipeline::PipelineContext;
use hubcore_storage::RepoStore;

use crate::concurrency::ConcurrencyLimiter;

/// Everything the two transport front-ends share. Cloning is an `Arc`
/// bump; the pipeline itself is built once and handed a fresh
/// `RequestContext` per push.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<PipelineContext>,
    pub engine: Arc<GitEngine>,
    pub storage: Arc<RepoStore>,
    pub principals: Arc<PrincipalRepository>,
    pub tokens: Arc<TokenRepository>,
    pub ssh_keys: Arc<SshKeyRepository>,
    pub owners: Arc<OwnerRepository>,
    pub lockout: Arc<LockoutTracker>,
    pub jwt: Arc<JwtCodec>,
    pub concurrency: Arc<ConcurrencyLimiter>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, storage: RepoStore, pipeline: PipelineContext) -> Self {
        let config = Arc::new(config);
        let jwt = Arc::new(JwtCodec::new(
            config.jwt.secret.as_bytes(),
            chrono::Duration::hours(config.jwt.expiration_hours as i64),
        ));
        Self {
            storage: Arc::new(storage),
            principals: Arc::new(PrincipalRepository::new(pool.clone())),
            tokens: Arc::new(TokenRepository::new(pool.clone())),
            ssh_keys: Arc::new(SshKeyRepository::new(pool.clone())),
            owners: Arc::new(OwnerRepository::new(pool.clone())),
            concurrency: Arc::new(ConcurrencyLimiter::new(config.limits.per_principal_concurrent_pushes)),
            engine: Arc::new(GitEngine::new()),
            pipeline: Arc::new(pipeline),
            jwt,
            lockout: Arc::new(LockoutTracker::default()),
            config,
        }
    }

    /// Resolve a principal's effective capability on `repo`, through the
    /// same short-TTL cache the write pipeline itself uses, so a fetch and
    /// a push against the same repository within the cache window share
    /// one database round trip.
    pub async fn resolve_capability(&self, principal_id: Option<Uuid>, repo: &RepoRecord) -> hubcore_db::Result<Capability> {
        if let Some(pid) = principal_id {
            if let Some(cached) = self.pipeline.capability_cache.get(pid, repo.id) {
                return Ok(cached);
            }
        }
        let facts = self.pipeline.grant_repo.capability_facts(principal_id, repo).await?;
        let capability = hubcore_auth::resolve_capability(facts);
        if let Some(pid) = principal_id {
            self.pipeline.capability_cache.insert(pid, repo.id, capability);
        }
        Ok(capability)
    }
}
