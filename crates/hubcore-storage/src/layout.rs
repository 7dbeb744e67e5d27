use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::paths::shard_of;

/// Stable, immutable repository identifier. Hex-formatted without dashes so
/// it doubles as a filesystem-safe directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RepositoryId(Uuid);

impl RepositoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Lowercase 32-character hex form, used as the on-disk directory name.
    pub fn hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl Default for RepositoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl std::str::FromStr for RepositoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Compute `<root>/<shard>/<id>.git` for a repository identifier.
///
/// The shard is the first two hex characters of the identifier, which keeps
/// any single directory from accumulating an unbounded number of entries.
/// The path is keyed entirely by identifier: renaming a repository's
/// `(owner, name)` in the metadata store never touches this path.
pub fn repo_git_dir(root: &Path, id: RepositoryId) -> PathBuf {
    let hex = id.hex();
    root.join(shard_of(&hex)).join(format!("{hex}.git"))
}

/// The `hub/` sidecar directory inside a bare repository: protection-rule
/// cache, core-owned hook scripts, and the write-pipeline's lock file.
pub fn hub_sidecar_dir(git_dir: &Path) -> PathBuf {
    git_dir.join("hub")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_dir_is_sharded_by_first_two_hex_chars() {
        let id = RepositoryId::from_uuid(Uuid::parse_str("ab120000-0000-0000-0000-000000000000").unwrap());
        let path = repo_git_dir(Path::new("/data/repos"), id);
        assert_eq!(path, Path::new("/data/repos/ab/ab1200000000000000000000000000.git"));
    }

    #[test]
    fn roundtrips_through_display_and_from_str() {
        let id = RepositoryId::new();
        let parsed: RepositoryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
