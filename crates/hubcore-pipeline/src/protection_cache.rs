//! On-disk cache of a repository's protection rules at
//! `<hub_dir>/protection.json`, so the hot push path doesn't take a
//! metadata round trip on every push (`hubcore_db::protection`'s doc
//! comment names this file as the cache it backs). Refreshed from
//! Postgres whenever stale; always correct on a cold cache, since
//! `protection.rules` is re-read from the store the first time a
//! repository is touched after startup.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hubcore_protect::ProtectionRule;
use serde::{Deserialize, Serialize};

use hubcore_db::ProtectionRepository;

use crate::error::Result;

/// How long a cached rule set is trusted before a refresh is forced. Rule
/// edits therefore take up to this long to take effect on a hot
/// repository — acceptable, since protection rules change far less often
/// than pushes happen.
const CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    cached_at_unix_secs: u64,
    rules: Vec<ProtectionRule>,
}

fn now_unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn cache_path(hub_dir: &Path) -> std::path::PathBuf {
    hub_dir.join("protection.json")
}

fn read_cache(hub_dir: &Path) -> Option<CacheFile> {
    let bytes = std::fs::read(cache_path(hub_dir)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn write_cache(hub_dir: &Path, rules: &[ProtectionRule]) {
    let file = CacheFile {
        cached_at_unix_secs: now_unix_secs(),
        rules: rules.to_vec(),
    };
    if let Ok(bytes) = serde_json::to_vec(&file) {
        // Best-effort: a failed cache write never blocks a push, it just
        // means the next push also pays a database round trip.
        let _ = std::fs::write(cache_path(hub_dir), bytes);
    }
}

/// Load this repository's protection rules, refreshing from the metadata
/// store if the on-disk cache is missing or older than [`CACHE_TTL`].
pub async fn load_rules(
    hub_dir: &Path,
    protection_repo: &ProtectionRepository,
    repository_id: uuid::Uuid,
) -> Result<Vec<ProtectionRule>> {
    if let Some(cache) = read_cache(hub_dir) {
        let age = now_unix_secs().saturating_sub(cache.cached_at_unix_secs);
        if age < CACHE_TTL.as_secs() {
            return Ok(cache.rules);
        }
    }

    let rules = protection_repo.list_by_repo(repository_id).await?;
    write_cache(hub_dir, &rules);
    Ok(rules)
}

/// Invalidate the cache immediately, for callers (e.g. a protection-rule
/// admin endpoint) that need the next push to see a rule change without
/// waiting out the TTL.
pub fn invalidate(hub_dir: &Path) {
    let _ = std::fs::remove_file(cache_path(hub_dir));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> ProtectionRule {
        ProtectionRule {
            pattern: "main".to_string(),
            block_force_push: true,
            block_deletion: true,
            required_approving_review_count: 1,
            required_status_checks: vec!["ci/build".to_string()],
            require_strict_status_checks: false,
            admins_bypass: false,
        }
    }

    #[test]
    fn missing_cache_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_cache(dir.path()).is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), &[sample_rule()]);

        let cache = read_cache(dir.path()).unwrap();
        assert_eq!(cache.rules.len(), 1);
        assert_eq!(cache.rules[0].pattern, "main");
    }

    #[test]
    fn invalidate_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), &[sample_rule()]);
        assert!(cache_path(dir.path()).exists());

        invalidate(dir.path());
        assert!(!cache_path(dir.path()).exists());
    }
}
