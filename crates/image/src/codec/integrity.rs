//! Subresource-integrity style digests (`sha384-<base64>`).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};

fn digest(algorithm: &str, bytes: &[u8]) -> Option<String> {
    let raw = match algorithm {
        "sha256" => Sha256::digest(bytes).to_vec(),
        "sha384" => Sha384::digest(bytes).to_vec(),
        "sha512" => Sha512::digest(bytes).to_vec(),
        _ => return None,
    };
    Some(STANDARD.encode(raw))
}

fn tokens(integrity: &str) -> impl Iterator<Item = (&str, &str)> {
    integrity
        .split_whitespace()
        .filter_map(|token| token.split_once('-'))
}

/// Whether `integrity` is a well-formed list of `sha256`/`sha384`/`sha512`
/// digests.
pub fn is_valid_sri(integrity: &str) -> bool {
    let mut any = false;
    for token in integrity.split_whitespace() {
        let Some((algorithm, hash)) = token.split_once('-') else {
            return false;
        };
        if !matches!(algorithm, "sha256" | "sha384" | "sha512") || STANDARD.decode(hash).is_err() {
            return false;
        }
        any = true;
    }
    any
}

/// Check `bytes` against an integrity string. Any listed digest matching is
/// enough.
pub fn verify_integrity(bytes: &[u8], integrity: &str) -> bool {
    tokens(integrity).any(|(algorithm, expected)| {
        digest(algorithm, bytes).is_some_and(|actual| actual == expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sri(algorithm: &str, bytes: &[u8]) -> String {
        format!("{}-{}", algorithm, digest(algorithm, bytes).unwrap())
    }

    #[test]
    fn test_known_sha256() {
        assert_eq!(
            sri("sha256", b"hello"),
            "sha256-LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ="
        );
    }

    #[test]
    fn test_verify() {
        let body = b"decoder binary";
        assert!(verify_integrity(body, &sri("sha384", body)));
        assert!(verify_integrity(body, &format!("sha256-AAAA {}", sri("sha512", body))));
        assert!(!verify_integrity(b"tampered", &sri("sha384", body)));
        assert!(!verify_integrity(body, "md5-abc"));
    }

    #[test]
    fn test_validity() {
        assert!(is_valid_sri(&sri("sha384", b"x")));
        assert!(!is_valid_sri(""));
        assert!(!is_valid_sri("sha1-abcd"));
        assert!(!is_valid_sri("sha384"));
        assert!(!is_valid_sri("sha384-not base64!"));
    }
}
