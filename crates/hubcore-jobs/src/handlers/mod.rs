pub mod ci;
pub mod mirror;
pub mod search;
pub mod webhook;

/// Job kind strings. A worker dispatches on these literal values; they are
/// also what callers pass to `JobRepository::enqueue`.
pub mod kind {
    pub const WEBHOOK_DELIVER: &str = "webhook.deliver";
    pub const SEARCH_INDEX: &str = "search.index";
    pub const CI_TRIGGER: &str = "ci.trigger";
    pub const REPO_IMPORT: &str = "repo.import";
    pub const REPO_EXPORT: &str = "repo.export";
    pub const REPO_PURGE: &str = "repo.purge";
}
