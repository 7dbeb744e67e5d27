use crate::error::{Error, Result};

/// Validate a git reference name.
///
/// Rejects spaces, tabs, control characters, `..`, `@{`, a trailing `.`,
/// and a `.lock` suffix, per git's `check-ref-format` rules.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref_name("ref name must not be empty"));
    }

    for ch in name.chars() {
        match ch {
            ' ' | '\t' | '\n' | '\r' | '\\' | '^' | '~' | '?' | '*' | '[' | ':' => {
                return Err(Error::invalid_ref_name(format!(
                    "ref name contains invalid character: {:?}",
                    ch,
                )));
            }
            _ => {}
        }
    }

    if name.contains("..") {
        return Err(Error::invalid_ref_name("ref name must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(Error::invalid_ref_name("ref name must not contain '@{'"));
    }
    if name.ends_with('.') {
        return Err(Error::invalid_ref_name("ref name must not end with '.'"));
    }
    if name.ends_with(".lock") {
        return Err(Error::invalid_ref_name(
            "ref name must not end with '.lock'",
        ));
    }

    Ok(())
}

/// Return the two-character shard prefix used to bucket repositories on disk.
///
/// `id` is the lowercase hex form of a repository identifier; shallow
/// sharding keeps any single directory from accumulating too many entries.
pub fn shard_of(id_hex: &str) -> &str {
    &id_hex[..2.min(id_hex.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_ref_ok() {
        assert!(validate_ref_name("refs/heads/main").is_ok());
    }

    #[test]
    fn validate_ref_rejects_space() {
        assert!(validate_ref_name("refs/heads/my branch").is_err());
    }

    #[test]
    fn validate_ref_rejects_dotdot() {
        assert!(validate_ref_name("refs/heads/a..b").is_err());
    }

    #[test]
    fn validate_ref_rejects_trailing_dot() {
        assert!(validate_ref_name("refs/heads/a.").is_err());
    }

    #[test]
    fn validate_ref_rejects_dot_lock() {
        assert!(validate_ref_name("refs/heads/a.lock").is_err());
    }

    #[test]
    fn shard_takes_first_two_chars() {
        assert_eq!(shard_of("ab12cd"), "ab");
    }
}
