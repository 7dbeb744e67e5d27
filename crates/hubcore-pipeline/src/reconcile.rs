//! Startup reconciliation: catches the crash window between step 4
//! (ref update applied on disk) and step 6 (metadata transaction
//! committed). Scans every repository whose on-disk refs moved more
//! recently than `last_reconciled_at` and rebuilds `ref_records` to
//! match. No events are replayed for a reconciled repository — events
//! only ever fire from the committed outbox, never from this scan.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use hubcore_db::repository::RepoRepository;
use hubcore_db::RefRepository;
use hubcore_storage::refs as storage_refs;
use hubcore_storage::RepositoryId;

use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};

/// Outcome of scanning one repository, returned for observability; the
/// caller logs a summary rather than acting on it further.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub repository_id: Uuid,
    pub refs_rewritten: usize,
}

/// Run once at process startup, before accepting transport connections.
/// Safe to run concurrently with live traffic too — a repository that's
/// mid-push simply gets reconciled again on the next scan if this one
/// races it, since reconciliation only ever makes `ref_records` match
/// what's already durable on disk.
pub async fn reconcile_all(ctx: &PipelineContext) -> Result<Vec<ReconcileOutcome>> {
    let repos = ctx.repo_repo.list_all().await?;
    let mut outcomes = Vec::with_capacity(repos.len());

    for repo in repos {
        let repo_id = RepositoryId::from_uuid(repo.id);
        let handle = match ctx.storage.open(repo_id) {
            Ok(h) => h,
            Err(e) => {
                // The metadata row exists but the bare repo doesn't: an
                // invariant violation (spec's Fatal kind), not something
                // this scan can fix. Log and move on to the next repo
                // rather than aborting the whole startup scan.
                tracing::error!(repository_id = %repo.id, error = %e, "repository row present but bare repo missing");
                continue;
            }
        };

        let ref_mtime = match latest_ref_mtime(&handle.git_dir().join("refs"), &handle.git_dir().join("packed-refs")) {
            Some(t) => t,
            None => continue,
        };

        let due = match repo.last_reconciled_at {
            None => true,
            Some(last) => last < ref_mtime,
        };
        if !due {
            continue;
        }

        let git_repo = handle.open_repository().map_err(PipelineError::from)?;
        let on_disk = storage_refs::list_refs(&git_repo, "refs/").map_err(PipelineError::from)?;
        drop(git_repo);

        let mut tx = ctx.pool.begin().await.map_err(|e| PipelineError::Transient(e.to_string()))?;
        let existing = ctx.ref_repo.list_by_repo(repo.id).await?;
        let mut existing_names: std::collections::HashSet<String> =
            existing.iter().map(|r| r.ref_name.clone()).collect();

        for (name, oid) in &on_disk {
            RefRepository::upsert_in_tx(&mut tx, repo.id, name, &oid.to_string()).await?;
            existing_names.remove(name);
        }
        // Anything left in `existing_names` is a ref_record with no
        // on-disk counterpart (e.g. a delete that committed on disk but
        // never reached the metadata transaction before the crash).
        for stale in &existing_names {
            RefRepository::delete_in_tx(&mut tx, repo.id, stale).await?;
        }

        RepoRepository::mark_reconciled_in_tx(&mut tx, repo.id).await?;
        tx.commit().await.map_err(|e| PipelineError::Transient(e.to_string()))?;

        outcomes.push(ReconcileOutcome {
            repository_id: repo.id,
            refs_rewritten: on_disk.len(),
        });
    }

    Ok(outcomes)
}

/// Latest modification time across the loose-refs directory and
/// `packed-refs`, the two places a ref update touches. `None` when
/// neither exists or neither is readable, in which case this repository
/// is skipped rather than treated as always-due.
fn latest_ref_mtime(refs_dir: &std::path::Path, packed_refs: &std::path::Path) -> Option<DateTime<Utc>> {
    let mut latest: Option<std::time::SystemTime> = None;

    fn walk(dir: &std::path::Path, latest: &mut Option<std::time::SystemTime>) {
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else { continue };
            if metadata.is_dir() {
                walk(&entry.path(), latest);
            } else if let Ok(modified) = metadata.modified() {
                let newer = match *latest {
                    Some(l) => modified > l,
                    None => true,
                };
                if newer {
                    *latest = Some(modified);
                }
            }
        }
    }

    walk(refs_dir, &mut latest);
    if let Ok(metadata) = std::fs::metadata(packed_refs) {
        if let Ok(modified) = metadata.modified() {
            let newer = match latest {
                Some(l) => modified > l,
                None => true,
            };
            if newer {
                latest = Some(modified);
            }
        }
    }

    latest.map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_refs_dir_and_packed_refs_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = latest_ref_mtime(&dir.path().join("refs"), &dir.path().join("packed-refs"));
        assert!(result.is_none());
    }

    #[test]
    fn picks_up_a_loose_ref_under_the_refs_directory() {
        let dir = tempfile::tempdir().unwrap();
        let refs_dir = dir.path().join("refs").join("heads");
        std::fs::create_dir_all(&refs_dir).unwrap();
        std::fs::write(refs_dir.join("main"), "1111111111111111111111111111111111111111\n").unwrap();

        let result = latest_ref_mtime(&dir.path().join("refs"), &dir.path().join("packed-refs"));
        assert!(result.is_some());
    }

    #[test]
    fn falls_back_to_packed_refs_when_no_loose_refs_exist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("packed-refs"), "# pack-refs with: peeled fully-peeled sorted\n").unwrap();

        let result = latest_ref_mtime(&dir.path().join("refs"), &dir.path().join("packed-refs"));
        assert!(result.is_some());
    }
}
