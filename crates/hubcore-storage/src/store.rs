use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::layout::{hub_sidecar_dir, repo_git_dir, RepositoryId};
use crate::paths::validate_ref_name;
use crate::reflog::{self, ZERO_SHA};
use crate::refs;

/// Default identity used for pipeline-authored commits (merge commits,
/// initial-branch creation). Real author/committer identity for ordinary
/// pushes comes from the pushed commit objects themselves.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: "hub".to_string(),
            email: "hub@localhost".to_string(),
        }
    }
}

/// Root of the on-disk repository store: a sharded collection of bare git
/// repositories, each identified by [`RepositoryId`] rather than by name.
///
/// Owner/name are metadata-store concepts only; renaming a repository never
/// touches this layer.
#[derive(Debug, Clone)]
pub struct RepoStore {
    root: PathBuf,
    signature: Signature,
}

impl RepoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            signature: Signature::default(),
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self, id: RepositoryId) -> bool {
        repo_git_dir(&self.root, id).is_dir()
    }

    /// Create a new bare repository for `id`, with an initial commit on
    /// `default_branch` and HEAD pointing at it.
    ///
    /// Creation happens in a same-shard scratch directory and is published
    /// with a single `rename(2)`, so a crash mid-init never leaves a
    /// partially-built repository visible at its final path.
    pub fn create(&self, id: RepositoryId, default_branch: &str) -> Result<RepoHandle> {
        validate_ref_name(&format!("refs/heads/{default_branch}"))?;

        let final_dir = repo_git_dir(&self.root, id);
        if final_dir.exists() {
            return Err(Error::already_exists(id));
        }

        let shard_dir = final_dir
            .parent()
            .expect("repo_git_dir always has a shard parent")
            .to_path_buf();
        std::fs::create_dir_all(&shard_dir).map_err(|e| Error::io(&shard_dir, e))?;

        let scratch_dir = shard_dir.join(format!(".tmp-{}.git", id.hex()));
        if scratch_dir.exists() {
            std::fs::remove_dir_all(&scratch_dir).map_err(|e| Error::io(&scratch_dir, e))?;
        }

        let repo = git2::Repository::init_bare(&scratch_dir).map_err(Error::git)?;
        repo.config()
            .map_err(Error::git)?
            .set_str("core.logAllRefUpdates", "always")
            .map_err(Error::git)?;

        self.init_branch(&repo, &scratch_dir, default_branch)?;
        drop(repo);

        std::fs::create_dir_all(hub_sidecar_dir(&scratch_dir))
            .map_err(|e| Error::io(&scratch_dir, e))?;

        std::fs::rename(&scratch_dir, &final_dir).map_err(|e| Error::io(&final_dir, e))?;

        Ok(RepoHandle {
            id,
            git_dir: final_dir,
        })
    }

    fn init_branch(&self, repo: &git2::Repository, git_dir: &Path, branch: &str) -> Result<()> {
        let builder = repo.treebuilder(None).map_err(Error::git)?;
        let tree_oid = builder.write().map_err(Error::git)?;
        let tree = repo.find_tree(tree_oid).map_err(Error::git)?;

        let sig = git2::Signature::now(&self.signature.name, &self.signature.email)
            .map_err(Error::git)?;
        let refname = format!("refs/heads/{branch}");
        let message = format!("Initialize {branch}");

        let commit_oid = repo
            .commit(Some(&refname), &sig, &sig, &message, &tree, &[])
            .map_err(Error::git)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let committer_line = format!(
            "{} <{}> {} +0000",
            self.signature.name,
            self.signature.email,
            now.as_secs()
        );
        let _ = reflog::write_reflog_entry(
            git_dir,
            &refname,
            ZERO_SHA,
            &commit_oid.to_string(),
            &committer_line,
            &format!("commit (initial): {message}"),
        );

        refs::set_head(repo, &refname)?;
        Ok(())
    }

    /// Open an existing repository.
    pub fn open(&self, id: RepositoryId) -> Result<RepoHandle> {
        let git_dir = repo_git_dir(&self.root, id);
        if !git_dir.is_dir() {
            return Err(Error::not_found(id));
        }
        Ok(RepoHandle { id, git_dir })
    }

    /// Rename is a metadata-store concept: `(owner, name)` never appears in
    /// this layer's paths. This only refreshes the sidecar's display-name
    /// hint used by operator tooling (`hub repo ls` style listings) — it is
    /// advisory and never consulted for identity or access decisions.
    pub fn rename(&self, id: RepositoryId, new_owner: &str, new_name: &str) -> Result<()> {
        let handle = self.open(id)?;
        let hint_path = hub_sidecar_dir(&handle.git_dir).join("display_name");
        std::fs::create_dir_all(hint_path.parent().unwrap())
            .map_err(|e| Error::io(&handle.git_dir, e))?;
        std::fs::write(&hint_path, format!("{new_owner}/{new_name}"))
            .map_err(|e| Error::io(&hint_path, e))?;
        Ok(())
    }

    /// Move a repository's directory into `<root>/.trash/<id>.git`.
    ///
    /// Soft-deleted repositories are excluded from shard listings but kept
    /// on disk until [`RepoStore::purge`] reclaims the space; this gives
    /// operators a recovery window after an accidental deletion.
    pub fn soft_delete(&self, id: RepositoryId) -> Result<()> {
        let git_dir = repo_git_dir(&self.root, id);
        if !git_dir.is_dir() {
            return Err(Error::not_found(id));
        }

        let trash_dir = self.root.join(".trash");
        std::fs::create_dir_all(&trash_dir).map_err(|e| Error::io(&trash_dir, e))?;
        let trashed_path = trash_dir.join(format!("{}.git", id.hex()));
        std::fs::rename(&git_dir, &trashed_path).map_err(|e| Error::io(&trashed_path, e))?;
        Ok(())
    }

    /// Permanently remove a repository's on-disk data, whether still live
    /// or already soft-deleted. Irreversible.
    pub fn purge(&self, id: RepositoryId) -> Result<()> {
        let live_dir = repo_git_dir(&self.root, id);
        let trashed_dir = self.root.join(".trash").join(format!("{}.git", id.hex()));

        let mut removed_any = false;
        if live_dir.is_dir() {
            std::fs::remove_dir_all(&live_dir).map_err(|e| Error::io(&live_dir, e))?;
            removed_any = true;
        }
        if trashed_dir.is_dir() {
            std::fs::remove_dir_all(&trashed_dir).map_err(|e| Error::io(&trashed_dir, e))?;
            removed_any = true;
        }

        if removed_any {
            Ok(())
        } else {
            Err(Error::not_found(id))
        }
    }
}

/// A handle to one on-disk bare repository.
#[derive(Debug, Clone)]
pub struct RepoHandle {
    id: RepositoryId,
    git_dir: PathBuf,
}

impl RepoHandle {
    pub fn id(&self) -> RepositoryId {
        self.id
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn hub_dir(&self) -> PathBuf {
        hub_sidecar_dir(&self.git_dir)
    }

    pub fn open_repository(&self) -> Result<git2::Repository> {
        git2::Repository::open_bare(&self.git_dir).map_err(Error::git)
    }

    /// Total bytes occupied by objects, refs, and logs. Used for quota
    /// enforcement and storage accounting; not cheap, callers should cache
    /// or compute it off the request path.
    pub fn disk_usage(&self) -> Result<u64> {
        fn walk(dir: &Path) -> std::io::Result<u64> {
            let mut total = 0u64;
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let metadata = entry.metadata()?;
                if metadata.is_dir() {
                    total += walk(&entry.path())?;
                } else {
                    total += metadata.len();
                }
            }
            Ok(total)
        }

        walk(&self.git_dir).map_err(|e| Error::io(&self.git_dir, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RepoStore::new(dir.path());
        let id = RepositoryId::new();

        let handle = store.create(id, "main").unwrap();
        assert!(handle.git_dir().is_dir());
        assert!(store.exists(id));

        let repo = handle.open_repository().unwrap();
        let head_target = refs::head_target(&repo).unwrap();
        assert_eq!(head_target.as_deref(), Some("refs/heads/main"));

        let reopened = store.open(id).unwrap();
        assert_eq!(reopened.git_dir(), handle.git_dir());
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = RepoStore::new(dir.path());
        let id = RepositoryId::new();
        store.create(id, "main").unwrap();
        assert!(matches!(
            store.create(id, "main"),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn open_missing_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = RepoStore::new(dir.path());
        assert!(matches!(
            store.open(RepositoryId::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn soft_delete_then_purge_frees_both_locations() {
        let dir = tempfile::tempdir().unwrap();
        let store = RepoStore::new(dir.path());
        let id = RepositoryId::new();
        store.create(id, "main").unwrap();

        store.soft_delete(id).unwrap();
        assert!(!store.exists(id));

        store.purge(id).unwrap();
        assert!(matches!(store.purge(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn disk_usage_is_nonzero_after_initial_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = RepoStore::new(dir.path());
        let id = RepositoryId::new();
        let handle = store.create(id, "main").unwrap();
        assert!(handle.disk_usage().unwrap() > 0);
    }
}
