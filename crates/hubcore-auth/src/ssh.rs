use base64::Engine;
use sha2::{Digest, Sha256};

/// Compute the `SHA256:<base64-no-pad>` fingerprint of an SSH public key
/// blob (the same format `ssh-keygen -lf` prints), used as the lookup key
/// for registered deploy/user keys.
pub fn fingerprint(public_key_blob: &[u8]) -> String {
    let digest = Sha256::digest(public_key_blob);
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest);
    format!("SHA256:{encoded}")
}

/// Parse an `authorized_keys`-style line (`<algo> <base64> [comment]`) into
/// its decoded key blob. Returns `None` for blank lines or comments.
pub fn decode_authorized_key_line(line: &str) -> Option<Vec<u8>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut parts = line.split_whitespace();
    let _algo = parts.next()?;
    let b64 = parts.next()?;
    base64::engine::general_purpose::STANDARD.decode(b64).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_blob() {
        let blob = b"fake-key-material";
        assert_eq!(fingerprint(blob), fingerprint(blob));
        assert!(fingerprint(blob).starts_with("SHA256:"));
    }

    #[test]
    fn decodes_authorized_keys_line() {
        let blob = b"hello";
        let encoded = base64::engine::general_purpose::STANDARD.encode(blob);
        let line = format!("ssh-ed25519 {encoded} comment@example.com");
        assert_eq!(decode_authorized_key_line(&line).unwrap(), blob);
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        assert!(decode_authorized_key_line("# comment").is_none());
        assert!(decode_authorized_key_line("").is_none());
    }
}
