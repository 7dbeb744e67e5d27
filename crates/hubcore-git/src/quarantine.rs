//! Manual object quarantine for `receive-pack`.
//!
//! Incoming objects are indexed into a disposable directory that sees the
//! real object store only as an alternate (so delta bases resolve), never
//! the other way round. The write pipeline evaluates branch protection and
//! force-push detection against this quarantine before anything is made
//! visible in the real repository; a rejected push leaves the quarantine
//! directory to be discarded and the repository untouched. This mirrors
//! the pre-receive quarantine git itself uses internally, but keeps the
//! accept/reject decision in the pipeline rather than in a shell hook.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};

pub struct QuarantineDir {
    root: PathBuf,
}

impl QuarantineDir {
    /// Create a fresh quarantine directory under `<hub_dir>/quarantine/<id>`.
    pub fn create(hub_dir: &Path, id: uuid::Uuid) -> Result<Self> {
        let root = hub_dir.join("quarantine").join(id.simple().to_string());
        std::fs::create_dir_all(root.join("pack"))?;
        Ok(Self { root })
    }

    pub fn objects_dir(&self) -> &Path {
        &self.root
    }

    /// Index `pack_data` into this quarantine directory, resolving delta
    /// bases against `real_objects_dir` via `GIT_ALTERNATE_OBJECT_DIRECTORIES`.
    ///
    /// On success every object in the push — including objects whose
    /// validity depends on deltas against the existing repository — is
    /// readable from this directory, without having touched the real one.
    pub async fn index_pack(&self, real_objects_dir: &Path, pack_data: &[u8]) -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.arg("index-pack")
            .arg("--stdin")
            .arg("--fix-thin")
            .current_dir(&self.root)
            .env("GIT_OBJECT_DIRECTORY", &self.root)
            .env("GIT_ALTERNATE_OBJECT_DIRECTORIES", real_objects_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(Error::Spawn)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(pack_data).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::SubprocessFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    /// Open this quarantine directory (plus the real repo as an alternate)
    /// as a read-only `git2::Repository`-compatible object store, for
    /// merge-base/force-push checks against the newly-received objects.
    pub fn open_with_alternate(&self, real_repo_path: &Path) -> Result<git2::Repository> {
        let repo = git2::Repository::open_bare(real_repo_path)?;
        let odb = repo.odb()?;
        let quarantine_objects = self.root.clone();
        odb.add_disk_alternate(quarantine_objects.to_string_lossy().as_ref())?;
        Ok(repo)
    }

    /// Move every received pack into the real repository's object store.
    /// Called once the pipeline has durably committed the corresponding
    /// metadata-store transaction.
    pub fn migrate_into(&self, real_objects_dir: &Path) -> Result<()> {
        let quarantine_pack = self.root.join("pack");
        let real_pack = real_objects_dir.join("pack");
        std::fs::create_dir_all(&real_pack)?;

        if quarantine_pack.is_dir() {
            for entry in std::fs::read_dir(&quarantine_pack)? {
                let entry = entry?;
                let dest = real_pack.join(entry.file_name());
                std::fs::rename(entry.path(), dest)?;
            }
        }

        // Loose objects index-pack may have written directly under the
        // quarantine root (rare for a single incoming pack, but possible
        // for alternates-less thin-pack completions).
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_name() == "pack" {
                continue;
            }
            if entry.file_type()?.is_dir() && entry.file_name().to_string_lossy().len() == 2 {
                let dest = real_objects_dir.join(entry.file_name());
                std::fs::create_dir_all(&dest)?;
                for obj in std::fs::read_dir(entry.path())? {
                    let obj = obj?;
                    let dest_obj = dest.join(obj.file_name());
                    if !dest_obj.exists() {
                        std::fs::rename(obj.path(), dest_obj)?;
                    }
                }
            }
        }

        self.discard()
    }

    /// Remove the quarantine directory without migrating anything.
    pub fn discard(&self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// True if applying `new_oid` on top of `old_oid` would discard commits
/// that are only reachable from `old_oid` — i.e. a non-fast-forward update.
/// Deletions and branch creations are never force-pushes.
pub fn is_force_push(repo: &git2::Repository, old_oid: &str, new_oid: &str) -> bool {
    use crate::commands::ZERO_OID;
    if old_oid == ZERO_OID || new_oid == ZERO_OID {
        return false;
    }

    let (Ok(old), Ok(new)) = (
        git2::Oid::from_str(old_oid),
        git2::Oid::from_str(new_oid),
    ) else {
        return false;
    };

    match repo.merge_base(old, new) {
        Ok(base) => base != old,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(repo: &git2::Repository, refname: &str, parent: Option<git2::Oid>) -> git2::Oid {
        let sig = git2::Signature::now("t", "t@example.com").unwrap();
        let tree_oid = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        let parents: Vec<git2::Commit> = parent
            .map(|p| repo.find_commit(p).unwrap())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some(refname), &sig, &sig, "msg", &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn detects_non_fast_forward() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init_bare(dir.path()).unwrap();
        let c1 = commit(&repo, "refs/heads/main", None);
        let c2 = commit(&repo, "refs/heads/main", Some(c1));

        // fast-forward: c1 -> c2
        assert!(!is_force_push(&repo, &c1.to_string(), &c2.to_string()));

        // rewind: c2 -> c1 is not reachable forward, base != old(c2)
        assert!(is_force_push(&repo, &c2.to_string(), &c1.to_string()));
    }

    #[test]
    fn creation_and_deletion_are_never_force_pushes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init_bare(dir.path()).unwrap();
        let c1 = commit(&repo, "refs/heads/main", None);

        assert!(!is_force_push(
            &repo,
            crate::commands::ZERO_OID,
            &c1.to_string()
        ));
        assert!(!is_force_push(
            &repo,
            &c1.to_string(),
            crate::commands::ZERO_OID
        ));
    }
}
