//! pkt-line framing, as used by the git smart HTTP/SSH wire protocol.
//!
//! Every line is prefixed with a 4-hex-digit length (including the prefix
//! itself); a length of `0000` is the flush packet.

pub const FLUSH: &[u8] = b"0000";

/// Encode one pkt-line from raw bytes.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let len = data.len() + 4;
    let mut out = Vec::with_capacity(len);
    out.extend(format!("{len:04x}").into_bytes());
    out.extend_from_slice(data);
    out
}

/// Encode one pkt-line from a `&str` (convenience for protocol text lines).
pub fn encode_str(data: &str) -> Vec<u8> {
    encode(data.as_bytes())
}

pub fn flush() -> Vec<u8> {
    FLUSH.to_vec()
}

/// Side-band channels per the `side-band-64k` capability: 1 carries the
/// primary payload (e.g. `report-status`), 2 is progress text, 3 is a fatal
/// error that aborts the client. Each pkt-line payload is prefixed with the
/// channel byte.
pub mod sideband {
    pub const PACK_DATA: u8 = 1;
    pub const PROGRESS: u8 = 2;
    pub const ERROR: u8 = 3;
}

/// Wrap `data` as one or more side-band-64k pkt-lines on `channel`, chunked
/// to stay under the 64KiB pkt-line payload ceiling (minus the channel byte
/// and 4-byte length prefix).
pub fn encode_sideband(channel: u8, data: &[u8]) -> Vec<u8> {
    const MAX_CHUNK: usize = 65519; // 65520 - 1 (channel byte)
    if data.is_empty() {
        return encode(&[channel]);
    }
    let mut out = Vec::with_capacity(data.len() + 8);
    for chunk in data.chunks(MAX_CHUNK) {
        let mut framed = Vec::with_capacity(chunk.len() + 1);
        framed.push(channel);
        framed.extend_from_slice(chunk);
        out.extend(encode(&framed));
    }
    out
}

/// One decoded pkt-line: either a flush packet or a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Flush,
    Data(Vec<u8>),
}

/// Decode a buffer of concatenated pkt-lines.
///
/// Stops at the first malformed length prefix rather than erroring, since
/// the only caller (receive-pack command parsing) only needs the command
/// section preceding the packfile body and tolerates trailing garbage.
pub fn decode_all(buf: &[u8]) -> Vec<PktLine> {
    let mut lines = Vec::new();
    let mut pos = 0;

    while pos + 4 <= buf.len() {
        let Ok(len_str) = std::str::from_utf8(&buf[pos..pos + 4]) else {
            break;
        };
        let Ok(len) = usize::from_str_radix(len_str, 16) else {
            break;
        };

        if len == 0 {
            lines.push(PktLine::Flush);
            pos += 4;
            continue;
        }
        if len < 4 || pos + len > buf.len() {
            break;
        }

        lines.push(PktLine::Data(buf[pos + 4..pos + len].to_vec()));
        pos += len;
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_service_announcement() {
        let line = encode_str("# service=git-upload-pack\n");
        assert_eq!(line, b"001e# service=git-upload-pack\n");
    }

    #[test]
    fn decodes_data_and_flush() {
        let mut buf = encode_str("hello\n");
        buf.extend(flush());
        let lines = decode_all(&buf);
        assert_eq!(lines, vec![PktLine::Data(b"hello\n".to_vec()), PktLine::Flush]);
    }

    #[test]
    fn stops_on_truncated_length() {
        let lines = decode_all(b"0020short");
        assert!(lines.is_empty());
    }
}
