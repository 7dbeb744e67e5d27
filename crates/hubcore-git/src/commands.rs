use crate::pktline::{self, PktLine};

pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// One `<old-oid> <new-oid> <ref-name>` command line from a receive-pack
/// request, with the optional capabilities announced on the first line
/// stripped off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveCommand {
    pub old_oid: String,
    pub new_oid: String,
    pub ref_name: String,
}

impl ReceiveCommand {
    pub fn is_create(&self) -> bool {
        self.old_oid == ZERO_OID
    }

    pub fn is_delete(&self) -> bool {
        self.new_oid == ZERO_OID
    }

    pub fn is_update(&self) -> bool {
        !self.is_create() && !self.is_delete()
    }
}

/// Parse the command section of a `git-receive-pack` request body, up to
/// (and not including) the flush packet that terminates it and precedes
/// the packfile.
///
/// Returns the parsed commands and the byte offset in `body` where the
/// packfile starts (immediately after the terminating flush packet).
pub fn parse_receive_commands(body: &[u8]) -> (Vec<ReceiveCommand>, usize) {
    let mut commands = Vec::new();
    let mut pos = 0;

    while pos + 4 <= body.len() {
        let Ok(len_str) = std::str::from_utf8(&body[pos..pos + 4]) else {
            break;
        };
        let Ok(len) = usize::from_str_radix(len_str, 16) else {
            break;
        };

        if len == 0 {
            pos += 4;
            break;
        }
        if len < 4 || pos + len > body.len() {
            break;
        }

        let line = &body[pos + 4..pos + len];
        pos += len;

        let Ok(line_str) = std::str::from_utf8(line) else {
            continue;
        };
        let line_str = line_str.trim_end_matches('\n');
        let parts: Vec<&str> = line_str.split(' ').collect();
        if parts.len() < 3 {
            continue;
        }

        let old_oid = parts[0].to_string();
        let new_oid = parts[1].to_string();
        let ref_with_caps = parts[2..].join(" ");
        let ref_name = ref_with_caps
            .split('\0')
            .next()
            .unwrap_or(&ref_with_caps)
            .to_string();

        commands.push(ReceiveCommand {
            old_oid,
            new_oid,
            ref_name,
        });
    }

    (commands, pos)
}

/// Per-command outcome, used to build the `report-status` response.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Ok(String),
    Rejected(String, String),
}

/// Build a `report-status` pkt-line response body.
///
/// `unpack_ok` is `None` when unpacking the pack itself failed (in which
/// case every command is implicitly rejected and no per-ref lines follow,
/// per the report-status protocol).
pub fn format_report_status(unpack_error: Option<&str>, results: &[CommandResult]) -> Vec<u8> {
    let mut out = Vec::new();

    match unpack_error {
        None => out.extend(pktline::encode_str("unpack ok\n")),
        Some(reason) => out.extend(pktline::encode_str(&format!("unpack {reason}\n"))),
    }

    if unpack_error.is_none() {
        for result in results {
            match result {
                CommandResult::Ok(ref_name) => {
                    out.extend(pktline::encode_str(&format!("ok {ref_name}\n")));
                }
                CommandResult::Rejected(ref_name, reason) => {
                    out.extend(pktline::encode_str(&format!("ng {ref_name} {reason}\n")));
                }
            }
        }
    }

    out.extend(pktline::flush());
    out
}

/// Extract command lines from already-decoded pkt-lines (used in tests and
/// by callers that have decoded the whole request up front).
pub fn commands_from_lines(lines: &[PktLine]) -> Vec<ReceiveCommand> {
    let mut commands = Vec::new();
    for line in lines {
        let PktLine::Data(data) = line else { break };
        let Ok(text) = std::str::from_utf8(data) else { continue };
        let text = text.trim_end_matches('\n');
        let parts: Vec<&str> = text.split(' ').collect();
        if parts.len() < 3 {
            continue;
        }
        let ref_with_caps = parts[2..].join(" ");
        let ref_name = ref_with_caps.split('\0').next().unwrap_or(&ref_with_caps).to_string();
        commands.push(ReceiveCommand {
            old_oid: parts[0].to_string(),
            new_oid: parts[1].to_string(),
            ref_name,
        });
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(line: &str) -> Vec<u8> {
        pktline::encode_str(line)
    }

    #[test]
    fn parses_single_command_with_capabilities() {
        let mut body = Vec::new();
        body.extend(pkt(&format!(
            "{} 1111111111111111111111111111111111111111 refs/heads/main\0 report-status side-band-64k\n",
            ZERO_OID
        )));
        body.extend(pktline::flush());
        body.extend(b"PACK-DATA-HERE");

        let (commands, pack_offset) = parse_receive_commands(&body);
        assert_eq!(commands.len(), 1);
        assert!(commands[0].is_create());
        assert_eq!(commands[0].ref_name, "refs/heads/main");
        assert_eq!(&body[pack_offset..], b"PACK-DATA-HERE");
    }

    #[test]
    fn parses_multiple_commands() {
        let mut body = Vec::new();
        body.extend(pkt(&format!(
            "1111111111111111111111111111111111111111 2222222222222222222222222222222222222222 refs/heads/main\n"
        )));
        body.extend(pkt(&format!(
            "2222222222222222222222222222222222222222 {} refs/heads/old\n",
            ZERO_OID
        )));
        body.extend(pktline::flush());

        let (commands, _) = parse_receive_commands(&body);
        assert_eq!(commands.len(), 2);
        assert!(commands[0].is_update());
        assert!(commands[1].is_delete());
    }

    #[test]
    fn report_status_formats_mixed_results() {
        let out = format_report_status(
            None,
            &[
                CommandResult::Ok("refs/heads/main".into()),
                CommandResult::Rejected(
                    "refs/heads/protected".into(),
                    "protected branch".into(),
                ),
            ],
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("unpack ok\n"));
        assert!(text.contains("ok refs/heads/main\n"));
        assert!(text.contains("ng refs/heads/protected protected branch\n"));
    }

    #[test]
    fn report_status_skips_per_ref_lines_on_unpack_failure() {
        let out = format_report_status(Some("index-pack failed"), &[CommandResult::Ok("x".into())]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("unpack index-pack failed\n"));
        assert!(!text.contains("ok x"));
    }
}
