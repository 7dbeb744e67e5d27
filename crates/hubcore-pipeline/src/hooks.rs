//! Core-owned pre-receive hook execution. Distinct from a user-authored
//! git hook: this always runs `<hub_dir>/hooks/pre-receive` if present,
//! feeding it the standard `<old> <new> <ref>\n` lines on stdin the way
//! git itself invokes pre-receive, and treats a non-zero exit as a
//! whole-push rejection with the hook's stderr surfaced to the client.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use hubcore_git::ReceiveCommand;

use crate::error::{PipelineError, Result};

/// Run `<hub_dir>/hooks/pre-receive` against `commands` if the script
/// exists and is executable. Absence is not a failure — most repositories
/// have no hook installed.
pub async fn run_pre_receive(hub_dir: &Path, repo_dir: &Path, commands: &[ReceiveCommand]) -> Result<()> {
    let hook_path = hub_dir.join("hooks").join("pre-receive");
    if !hook_path.is_file() {
        return Ok(());
    }

    let mut stdin_body = String::new();
    for cmd in commands {
        stdin_body.push_str(&format!("{} {} {}\n", cmd.old_oid, cmd.new_oid, cmd.ref_name));
    }

    let mut child = Command::new(&hook_path)
        .current_dir(repo_dir)
        .env("GIT_DIR", repo_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PipelineError::Transient(format!("failed to spawn pre-receive hook: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(stdin_body.as_bytes())
            .await
            .map_err(|e| PipelineError::Transient(format!("failed to write to pre-receive hook: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| PipelineError::Transient(format!("pre-receive hook failed to run: {e}")))?;

    if !output.status.success() {
        let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if message.is_empty() {
            "pre-receive hook rejected the push".to_string()
        } else {
            message
        };
        return Err(PipelineError::ProtectionViolation(message));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn install_hook(hub_dir: &Path, script: &str) {
        let hooks_dir = hub_dir.join("hooks");
        std::fs::create_dir_all(&hooks_dir).unwrap();
        let path = hooks_dir.join("pre-receive");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[tokio::test]
    async fn absent_hook_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_pre_receive(dir.path(), dir.path(), &[]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn exit_zero_accepts_the_push() {
        let dir = tempfile::tempdir().unwrap();
        install_hook(dir.path(), "#!/bin/sh\nexit 0\n");
        let commands = vec![ReceiveCommand {
            old_oid: hubcore_git::ZERO_OID.to_string(),
            new_oid: "1111111111111111111111111111111111111111".to_string(),
            ref_name: "refs/heads/main".to_string(),
        }];
        let result = run_pre_receive(dir.path(), dir.path(), &commands).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn nonzero_exit_rejects_with_stderr_message() {
        let dir = tempfile::tempdir().unwrap();
        install_hook(dir.path(), "#!/bin/sh\necho 'no pushes on Friday' >&2\nexit 1\n");
        let result = run_pre_receive(dir.path(), dir.path(), &[]).await;
        match result {
            Err(PipelineError::ProtectionViolation(msg)) => assert_eq!(msg, "no pushes on Friday"),
            other => panic!("expected ProtectionViolation, got {other:?}"),
        }
    }
}
