//! Supplies the review/status-check facts [`hubcore_protect::evaluate`]
//! needs but that live outside this core (pull requests and CI are out of
//! scope). A real deployment would back this with the PR/issue model; here
//! it's a seam so protection rules that require reviews or checks still
//! evaluate deterministically rather than being silently ignored.

use std::collections::HashSet;

use async_trait::async_trait;

/// One proposed branch update's review/check state, gathered before
/// evaluation so [`hubcore_protect::evaluate`] stays pure.
#[derive(Debug, Clone, Default)]
pub struct ReviewFacts {
    pub approving_review_count: u32,
    pub passing_status_checks: HashSet<String>,
    pub branch_is_up_to_date_with_base: bool,
}

/// Source of [`ReviewFacts`] for a branch. Out-of-scope systems (a PR
/// model, a CI status API) implement this; [`NoReviews`] is the default
/// when neither is wired up, so every protection rule requiring approvals
/// or checks is simply never satisfiable — fail closed, not silently
/// ignored.
#[async_trait]
pub trait ReviewFactsProvider: Send + Sync {
    async fn review_facts(&self, repository_id: uuid::Uuid, branch: &str) -> ReviewFacts;
}

/// No pull-request or CI system wired up: every branch reports zero
/// approvals, no passing checks, and "not up to date" so a strict rule
/// never passes by default. Rules with zero requirements (the common case
/// for a bare force-push/deletion guard) are unaffected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReviews;

#[async_trait]
impl ReviewFactsProvider for NoReviews {
    async fn review_facts(&self, _repository_id: uuid::Uuid, _branch: &str) -> ReviewFacts {
        ReviewFacts::default()
    }
}
