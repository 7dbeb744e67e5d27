use crate::error::{Error, Result};

/// Read-only, sorted snapshot of a repository's references.
///
/// Used by the Git Engine to answer advertisement requests and by
/// metadata reconciliation to compare on-disk refs against `ref_records`.
pub fn list_refs(repo: &git2::Repository, prefix: &str) -> Result<Vec<(String, git2::Oid)>> {
    let mut out = Vec::new();
    let refs = repo.references_glob(&format!("{prefix}*")).map_err(Error::git)?;
    for r in refs {
        let reference = r.map_err(Error::git)?;
        let Some(name) = reference.name() else { continue };
        let Some(oid) = reference.target() else { continue };
        out.push((name.to_string(), oid));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Current target of a single ref, or `None` if it does not exist.
pub fn get_ref(repo: &git2::Repository, full_name: &str) -> Result<Option<git2::Oid>> {
    match repo.find_reference(full_name) {
        Ok(r) => Ok(r.target()),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(Error::git(e)),
    }
}

/// Compare-and-swap update of a ref: succeeds only if the current value
/// matches `expected_old` (or the ref is absent and `expected_old` is
/// `None`). This is the sole ref-mutation primitive the write pipeline
/// uses, so every accepted push either lands atomically or reports a
/// conflict — never a silent overwrite of a concurrent writer.
pub fn compare_and_swap(
    repo: &git2::Repository,
    full_name: &str,
    expected_old: Option<git2::Oid>,
    new: git2::Oid,
    log_message: &str,
) -> Result<()> {
    let current = get_ref(repo, full_name)?;
    if current != expected_old {
        return Err(Error::Git(
            format!(
                "compare-and-swap failed on {full_name}: expected {expected_old:?}, found {current:?}"
            )
            .into(),
        ));
    }

    repo.reference(full_name, new, true, log_message)
        .map_err(Error::git)?;
    Ok(())
}

/// Delete a ref, but only if it still points at `expected_old`.
pub fn compare_and_delete(
    repo: &git2::Repository,
    full_name: &str,
    expected_old: Option<git2::Oid>,
) -> Result<()> {
    let current = get_ref(repo, full_name)?;
    if current != expected_old {
        return Err(Error::Git(
            format!("compare-and-delete failed on {full_name}: ref moved under us").into(),
        ));
    }
    if let Ok(mut reference) = repo.find_reference(full_name) {
        reference.delete().map_err(Error::git)?;
    }
    Ok(())
}

/// The symbolic target of HEAD (e.g. `refs/heads/main`), used to track the
/// repository's default branch.
pub fn head_target(repo: &git2::Repository) -> Result<Option<String>> {
    match repo.find_reference("HEAD") {
        Ok(head) => Ok(head.symbolic_target().map(|s| s.to_string())),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(Error::git(e)),
    }
}

/// Point HEAD at a new branch (used when the default branch is first
/// created, or changed by an admin).
pub fn set_head(repo: &git2::Repository, full_branch_ref: &str) -> Result<()> {
    repo.set_head(full_branch_ref).map_err(Error::git)
}
