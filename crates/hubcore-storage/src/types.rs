/// One ref-level change between a source and destination ref set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefChange {
    pub ref_name: String,
    pub old_target: Option<String>,
    pub new_target: Option<String>,
}

/// The set of additions, updates, and deletions needed to bring a
/// destination ref set in line with a source ref set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorDiff {
    pub add: Vec<RefChange>,
    pub update: Vec<RefChange>,
    pub delete: Vec<RefChange>,
}

impl MirrorDiff {
    pub fn in_sync(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Options controlling a mirror export (`repo.export` job).
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub refs: Option<Vec<String>>,
    pub dry_run: bool,
    pub bundle: bool,
}

/// Options controlling a mirror import (`repo.import` job).
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub refs: Option<Vec<String>>,
    pub dry_run: bool,
    pub bundle: bool,
    /// Bearer/basic token to inject into an HTTPS source URL's userinfo.
    pub token: Option<String>,
}
