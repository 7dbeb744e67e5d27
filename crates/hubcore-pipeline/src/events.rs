//! Outbox event shapes the write pipeline commits alongside a push.
//!
//! The pipeline itself only ever writes one event kind, `repository.pushed`
//! — a plain statement of fact, independent of which downstream consumers
//! care about it. The outbox relay (`hubcore_jobs::relay`) is what fans
//! this out into `webhook.deliver`, `search.index`, and `ci.trigger` job
//! rows, per the CI/search/webhook external interfaces in the spec this
//! crate implements.

use serde::Serialize;
use uuid::Uuid;

pub const REPOSITORY_PUSHED: &str = "repository.pushed";
pub const REPOSITORY_DELETED: &str = "repository.deleted";

/// One ref's before/after state within a single push, embedded in the
/// `repository.pushed` event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RefUpdate {
    pub ref_name: String,
    pub old_oid: String,
    pub new_oid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryPushedPayload {
    pub repository_id: Uuid,
    pub pusher_principal_id: Option<Uuid>,
    pub updates: Vec<RefUpdate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryDeletedPayload {
    pub repository_id: Uuid,
}
