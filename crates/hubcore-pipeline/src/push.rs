//! Orchestrates the accept path of one `git-receive-pack` request: the
//! eight numbered steps of the write pipeline, under the two-lock
//! ordering (filesystem lock acquired before the repository row lock).

use std::collections::HashMap;

use uuid::Uuid;

use hubcore_auth::Capability;
use hubcore_db::repository::{RepoRecord, RepoRepository};
use hubcore_db::{AuditRepository, OutboxRepository, RefRepository};
use hubcore_git::commands::format_report_status;
use hubcore_git::{is_force_push, CommandResult, QuarantineDir, ReceiveCommand};
use hubcore_protect::{evaluate, PushContext};
use hubcore_storage::{RepoLockGuard, RepositoryId};

use crate::context::{PipelineContext, RequestContext};
use crate::error::{PipelineError, Result};
use crate::events::{RefUpdate, RepositoryPushedPayload, REPOSITORY_PUSHED};
use crate::hooks::run_pre_receive;
use crate::protection_cache;

/// Per-command outcome plus the raw `report-status` bytes ready to be
/// framed on the Git side-band by the transport front-end.
pub struct PushOutcome {
    pub report_status: Vec<u8>,
    pub accepted: Vec<String>,
    pub rejected: Vec<(String, String)>,
}

pub struct ReceivePushPipeline {
    ctx: PipelineContext,
}

impl ReceivePushPipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(
        skip(self, commands, pack_data, req),
        fields(repository_id = %repo.id, correlation_id = %req.correlation_id, commands = commands.len())
    )]
    pub async fn run(
        &self,
        repo: &RepoRecord,
        principal_id: Option<Uuid>,
        commands: Vec<ReceiveCommand>,
        pack_data: &[u8],
        req: &RequestContext,
    ) -> Result<PushOutcome> {
        if commands.is_empty() {
            return Ok(PushOutcome {
                report_status: format_report_status(None, &[]),
                accepted: vec![],
                rejected: vec![],
            });
        }

        // 1. Authorize.
        let capability = self.resolve_capability(principal_id, repo).await?;
        if !capability.can_write() {
            return Err(if principal_id.is_none() {
                PipelineError::AuthFailure
            } else {
                PipelineError::PermissionDenied
            });
        }
        let actor_is_admin = capability.can_administer();

        let repo_id = RepositoryId::from_uuid(repo.id);
        let handle = self.ctx.storage.open(repo_id)?;
        let hub_dir = handle.hub_dir();
        let git_dir = handle.git_dir().to_path_buf();

        let quarantine = QuarantineDir::create(&hub_dir, Uuid::new_v4())?;
        quarantine.index_pack(&git_dir.join("objects"), pack_data).await?;

        // 2. Evaluate every proposed command against cached protection
        // rules and force-push/deletion facts gathered from the
        // quarantine (so the decision never depends on objects that
        // might still be rejected).
        let rules = protection_cache::load_rules(&hub_dir, &self.ctx.protection_repo, repo.id).await?;
        let rejected = {
            let quarantined_repo = quarantine.open_with_alternate(&git_dir)?;
            let mut rejected = Vec::new();
            for cmd in &commands {
                let branch = short_branch_name(&cmd.ref_name);
                let review_facts = self.ctx.review_facts.review_facts(repo.id, branch).await;
                let push_ctx = PushContext {
                    branch: branch.to_string(),
                    is_force_push: is_force_push(&quarantined_repo, &cmd.old_oid, &cmd.new_oid),
                    is_deletion: cmd.is_delete(),
                    actor_is_admin,
                    approving_review_count: review_facts.approving_review_count,
                    passing_status_checks: review_facts.passing_status_checks,
                    branch_is_up_to_date_with_base: review_facts.branch_is_up_to_date_with_base,
                };
                if let Err(violation) = evaluate(&rules, &push_ctx) {
                    rejected.push((cmd.ref_name.clone(), violation.to_string()));
                }
            }
            rejected
        };

        // Failure semantics: any rejected command denies the whole push.
        // The quarantine is discarded and nothing downstream runs.
        if !rejected.is_empty() {
            quarantine.discard()?;
            self.record_denial(repo.id, principal_id, &rejected).await?;
            return Ok(all_rejected_outcome(&commands, &rejected));
        }

        // 3. Pre-receive hook. Core-owned script, not a user git hook.
        if let Err(e) = run_pre_receive(&hub_dir, &git_dir, &commands).await {
            quarantine.discard()?;
            let reason = e.to_string();
            let rejected_all: Vec<(String, String)> =
                commands.iter().map(|c| (c.ref_name.clone(), reason.clone())).collect();
            self.record_denial(repo.id, principal_id, &rejected_all).await?;
            return Ok(all_rejected_outcome(&commands, &rejected_all));
        }

        // 4-5. Migrate quarantined objects into the real object store,
        // then apply each ref update under compare-and-swap. Migration
        // must happen first: a ref can never point at an object the real
        // store doesn't have yet, even for the instant between the two.
        let committer_line = committer_line_for(principal_id);
        let lock_guard = {
            let hub_dir = hub_dir.clone();
            tokio::task::spawn_blocking(move || RepoLockGuard::acquire(&hub_dir))
                .await
                .map_err(|e| PipelineError::Transient(format!("lock acquisition task panicked: {e}")))??
        };

        let results: Vec<CommandResult> = {
            let git_dir = git_dir.clone();
            let committer_line = committer_line.clone();
            let commands = commands.clone();
            tokio::task::spawn_blocking(move || {
                hubcore_git::receive::migrate_and_apply(&git_dir, &quarantine, &committer_line, &commands)
            })
            .await
            .map_err(|e| PipelineError::Transient(format!("apply task panicked: {e}")))??
        };

        // 6-7. Reconcile metadata and publish events in one transaction,
        // so an outbox row only ever exists for a durably committed push.
        let mut tx = self
            .ctx
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        let _locked_repo = self.ctx.repo_repo.lock_for_update(&mut tx, repo.id).await?;

        let mut updates = Vec::new();
        for (cmd, result) in commands.iter().zip(results.iter()) {
            if let CommandResult::Ok(ref_name) = result {
                if cmd.is_delete() {
                    RefRepository::delete_in_tx(&mut tx, repo.id, ref_name).await?;
                } else {
                    RefRepository::upsert_in_tx(&mut tx, repo.id, ref_name, &cmd.new_oid).await?;
                }
                updates.push(RefUpdate {
                    ref_name: cmd.ref_name.clone(),
                    old_oid: cmd.old_oid.clone(),
                    new_oid: cmd.new_oid.clone(),
                });
            }
        }

        let size_bytes = {
            let handle = handle.clone();
            tokio::task::spawn_blocking(move || handle.disk_usage())
                .await
                .map_err(|e| PipelineError::Transient(format!("disk usage task panicked: {e}")))?
                .unwrap_or(0) as i64
        };
        RepoRepository::record_activity_in_tx(&mut tx, repo.id, size_bytes).await?;
        RepoRepository::mark_reconciled_in_tx(&mut tx, repo.id).await?;

        if !updates.is_empty() {
            AuditRepository::record_in_tx(
                &mut tx,
                Uuid::new_v4(),
                principal_id,
                Some(repo.id),
                "push",
                serde_json::json!({"correlation_id": req.correlation_id, "ref_count": updates.len()}),
            )
            .await?;

            let payload = RepositoryPushedPayload {
                repository_id: repo.id,
                pusher_principal_id: principal_id,
                updates: updates.clone(),
            };
            let payload_json =
                serde_json::to_value(&payload).map_err(|e| PipelineError::Fatal(e.to_string()))?;
            OutboxRepository::insert_in_tx(&mut tx, Uuid::new_v4(), Some(repo.id), REPOSITORY_PUSHED, payload_json)
                .await?;
        }

        tx.commit().await.map_err(|e| PipelineError::Transient(e.to_string()))?;

        // 8. Release the filesystem lock and report per-command status.
        drop(lock_guard);

        let report_status = format_report_status(None, &results);
        let accepted = results
            .iter()
            .filter_map(|r| match r {
                CommandResult::Ok(name) => Some(name.clone()),
                CommandResult::Rejected(..) => None,
            })
            .collect();
        let rejected = results
            .iter()
            .filter_map(|r| match r {
                CommandResult::Rejected(name, reason) => Some((name.clone(), reason.clone())),
                CommandResult::Ok(_) => None,
            })
            .collect();

        Ok(PushOutcome {
            report_status,
            accepted,
            rejected,
        })
    }

    async fn resolve_capability(&self, principal_id: Option<Uuid>, repo: &RepoRecord) -> Result<Capability> {
        if let Some(pid) = principal_id {
            if let Some(cached) = self.ctx.capability_cache.get(pid, repo.id) {
                return Ok(cached);
            }
        }
        let facts = self.ctx.grant_repo.capability_facts(principal_id, repo).await?;
        let capability = hubcore_auth::resolve_capability(facts);
        if let Some(pid) = principal_id {
            self.ctx.capability_cache.insert(pid, repo.id, capability);
        }
        Ok(capability)
    }

    async fn record_denial(
        &self,
        repository_id: Uuid,
        principal_id: Option<Uuid>,
        rejected: &[(String, String)],
    ) -> Result<()> {
        let detail = serde_json::json!({
            "rejected": rejected.iter().map(|(r, m)| serde_json::json!({"ref": r, "reason": m})).collect::<Vec<_>>(),
        });
        self.ctx
            .audit_repo
            .record(Uuid::new_v4(), principal_id, Some(repository_id), "push_denied", detail)
            .await?;
        Ok(())
    }
}

fn short_branch_name(ref_name: &str) -> &str {
    ref_name.strip_prefix("refs/heads/").unwrap_or(ref_name)
}

fn committer_line_for(principal_id: Option<Uuid>) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let who = principal_id.map(|p| p.to_string()).unwrap_or_else(|| "anonymous".to_string());
    format!("hub <{who}@hub.local> {} +0000", now.as_secs())
}

/// Build the rejected-everything outcome for a whole-push denial, mapping
/// explicit reasons onto the refs that produced them and a generic reason
/// onto the rest (a pre-receive hook rejection, for instance, applies to
/// every command even though only the hook itself produced a message).
fn all_rejected_outcome(commands: &[ReceiveCommand], reasons: &[(String, String)]) -> PushOutcome {
    let reason_map: HashMap<&str, &str> = reasons.iter().map(|(r, m)| (r.as_str(), m.as_str())).collect();
    let results: Vec<CommandResult> = commands
        .iter()
        .map(|c| {
            let reason = reason_map
                .get(c.ref_name.as_str())
                .copied()
                .unwrap_or("push rejected")
                .to_string();
            CommandResult::Rejected(c.ref_name.clone(), reason)
        })
        .collect();
    let report_status = format_report_status(None, &results);
    let rejected = results
        .into_iter()
        .filter_map(|r| match r {
            CommandResult::Rejected(name, reason) => Some((name, reason)),
            CommandResult::Ok(_) => None,
        })
        .collect();
    PushOutcome {
        report_status,
        accepted: vec![],
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubcore_git::ZERO_OID;

    fn cmd(old: &str, new: &str, ref_name: &str) -> ReceiveCommand {
        ReceiveCommand {
            old_oid: old.to_string(),
            new_oid: new.to_string(),
            ref_name: ref_name.to_string(),
        }
    }

    #[test]
    fn short_branch_name_strips_heads_prefix() {
        assert_eq!(short_branch_name("refs/heads/main"), "main");
        assert_eq!(short_branch_name("refs/tags/v1"), "refs/tags/v1");
    }

    #[test]
    fn committer_line_uses_anonymous_for_unauthenticated_pushes() {
        let line = committer_line_for(None);
        assert!(line.contains("anonymous@hub.local"));
    }

    #[test]
    fn committer_line_includes_principal_id() {
        let id = Uuid::new_v4();
        let line = committer_line_for(Some(id));
        assert!(line.contains(&id.to_string()));
    }

    #[test]
    fn all_rejected_outcome_maps_reasons_and_falls_back_for_the_rest() {
        let commands = vec![
            cmd(ZERO_OID, "1111111111111111111111111111111111111111", "refs/heads/main"),
            cmd(ZERO_OID, "2222222222222222222222222222222222222222", "refs/heads/other"),
        ];
        let reasons = vec![("refs/heads/main".to_string(), "force push to a protected branch is not allowed".to_string())];

        let outcome = all_rejected_outcome(&commands, &reasons);

        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected.len(), 2);
        let main_reason = outcome.rejected.iter().find(|(r, _)| r == "refs/heads/main").unwrap();
        assert_eq!(main_reason.1, "force push to a protected branch is not allowed");
        let other_reason = outcome.rejected.iter().find(|(r, _)| r == "refs/heads/other").unwrap();
        assert_eq!(other_reason.1, "push rejected");
    }
}
