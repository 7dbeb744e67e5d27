use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// One parsed line of a git reflog file.
#[derive(Debug, Clone)]
pub struct ReflogEntry {
    pub old_oid: String,
    pub new_oid: String,
    pub committer: String,
    pub timestamp: i64,
    pub tz_offset: String,
    pub message: String,
}

/// Read and parse a ref's reflog, oldest entry first.
///
/// Returns an empty vec if the reflog does not exist yet, which is the
/// normal state for a ref that has never been updated through a path that
/// writes reflogs.
pub fn read_reflog(git_dir: &Path, full_ref_name: &str) -> Result<Vec<ReflogEntry>> {
    let path = git_dir.join("logs").join(full_ref_name);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(&path, e)),
    };

    let mut out = Vec::with_capacity(16);
    for line in contents.lines() {
        if let Some(entry) = parse_reflog_line(line) {
            out.push(entry);
        }
    }
    Ok(out)
}

fn parse_reflog_line(line: &str) -> Option<ReflogEntry> {
    let (oids, rest) = line.split_once('\t')?;
    let mut oid_parts = oids.split_whitespace();
    let old_oid = oid_parts.next()?.to_string();
    let new_oid = oid_parts.next()?.to_string();

    let (committer_part, message) = match rest.split_once('\n') {
        Some((c, m)) => (c, m.to_string()),
        None => (rest, String::new()),
    };

    let mut committer_tokens: Vec<&str> = committer_part.split_whitespace().collect();
    let tz_offset = committer_tokens.pop()?.to_string();
    let timestamp: i64 = committer_tokens.pop()?.parse().ok()?;
    let committer = committer_tokens.join(" ");

    Some(ReflogEntry {
        old_oid,
        new_oid,
        committer,
        timestamp,
        tz_offset,
        message,
    })
}

/// Append one entry to a ref's reflog, creating `logs/<ref>` and any parent
/// directories on first use.
pub fn write_reflog_entry(
    git_dir: &Path,
    full_ref_name: &str,
    old_oid: &str,
    new_oid: &str,
    committer_line: &str,
    message: &str,
) -> Result<()> {
    let path = git_dir.join("logs").join(full_ref_name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::io(&path, e))?;

    let message = message.replace('\n', " ");
    writeln!(file, "{old_oid} {new_oid} {committer_line}\t{message}")
        .map_err(|e| Error::io(&path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let line = "0000000000000000000000000000000000000000 abc123 Jane Doe <jane@example.com> 1700000000 +0000\tpush: create refs/heads/main";
        let entry = parse_reflog_line(line).unwrap();
        assert_eq!(entry.old_oid, ZERO_SHA);
        assert_eq!(entry.new_oid, "abc123");
        assert_eq!(entry.timestamp, 1700000000);
        assert_eq!(entry.tz_offset, "+0000");
        assert_eq!(entry.message, "push: create refs/heads/main");
    }

    #[test]
    fn roundtrips_through_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        write_reflog_entry(
            dir.path(),
            "refs/heads/main",
            ZERO_SHA,
            "abc123",
            "Jane Doe <jane@example.com> 1700000000 +0000",
            "push: create refs/heads/main",
        )
        .unwrap();

        let entries = read_reflog(dir.path(), "refs/heads/main").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].new_oid, "abc123");
    }

    #[test]
    fn missing_reflog_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = read_reflog(dir.path(), "refs/heads/missing").unwrap();
        assert!(entries.is_empty());
    }
}
