//! Orchestrates the accept path of a receive-pack request: migrate
//! quarantined objects into the real repository, then apply each ref
//! command with compare-and-swap semantics so a command whose expected old
//! value has moved under us is rejected rather than silently clobbered.

use std::path::Path;

use hubcore_storage::reflog;
use hubcore_storage::refs as storage_refs;

use crate::commands::{CommandResult, ReceiveCommand, ZERO_OID};
use crate::error::Result;
use crate::quarantine::QuarantineDir;

/// Apply every accepted command to `repo_path`, having already migrated
/// `quarantine`'s objects into place. Commands the caller has already
/// rejected (branch protection, force-push policy) should be filtered out
/// before calling this — they're reported separately by the caller.
pub fn apply_commands(
    repo_path: &Path,
    committer_line: &str,
    commands: &[ReceiveCommand],
) -> Result<Vec<CommandResult>> {
    let repo = git2::Repository::open_bare(repo_path)?;
    let mut results = Vec::with_capacity(commands.len());

    for cmd in commands {
        let expected_old = if cmd.old_oid == ZERO_OID {
            None
        } else {
            Some(git2::Oid::from_str(&cmd.old_oid)?)
        };

        let outcome = if cmd.new_oid == ZERO_OID {
            storage_refs::compare_and_delete(&repo, &cmd.ref_name, expected_old)
                .map(|_| ())
        } else {
            let new_oid = git2::Oid::from_str(&cmd.new_oid)?;
            let message = format!("push: update {}", cmd.ref_name);
            storage_refs::compare_and_swap(&repo, &cmd.ref_name, expected_old, new_oid, &message)
        };

        match outcome {
            Ok(()) => {
                let _ = reflog::write_reflog_entry(
                    repo_path,
                    &cmd.ref_name,
                    &cmd.old_oid,
                    &cmd.new_oid,
                    committer_line,
                    &format!("push: update {}", cmd.ref_name),
                );
                results.push(CommandResult::Ok(cmd.ref_name.clone()));
            }
            Err(e) => {
                tracing::warn!(ref_name = %cmd.ref_name, error = %e, "ref update rejected");
                results.push(CommandResult::Rejected(
                    cmd.ref_name.clone(),
                    "failed to update ref".to_string(),
                ));
            }
        }
    }

    Ok(results)
}

/// Migrate a quarantine directory's objects into the repository's real
/// object store, then apply `commands`. Call only after every command has
/// independently cleared branch protection and force-push policy.
pub fn migrate_and_apply(
    repo_path: &Path,
    quarantine: &QuarantineDir,
    committer_line: &str,
    commands: &[ReceiveCommand],
) -> Result<Vec<CommandResult>> {
    quarantine.migrate_into(&repo_path.join("objects"))?;
    apply_commands(repo_path, committer_line, commands)
}
