//! Content fingerprints for recognising identical analysis inputs.
//!
//! A fingerprint is SHA-256 over the document bytes followed by the UTF-8
//! bytes of the context text, hex encoded. It is a dedup key, not a MAC.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex length of a fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

/// Computes the fingerprint of `document` in the context of `context_text`
/// (a job description or a target role).
pub fn fingerprint(document: &[u8], context_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document);
    hasher.update(context_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Reads the document from disk, then fingerprints it.
pub async fn fingerprint_file(
    path: impl AsRef<Path>,
    context_text: &str,
) -> std::io::Result<String> {
    let document = tokio::fs::read(path).await?;
    Ok(fingerprint(&document, context_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_deterministic() {
        let doc = b"%PDF-1.7 resume bytes";
        assert_eq!(
            fingerprint(doc, "Senior Rust Engineer"),
            fingerprint(doc, "Senior Rust Engineer")
        );
    }

    #[test]
    fn test_known_vector() {
        // sha256("abc")
        assert_eq!(
            fingerprint(b"ab", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        let a = b"resume v1".to_vec();
        let mut b = a.clone();
        b[7] ^= 0x01;
        assert_ne!(fingerprint(&a, "jd"), fingerprint(&b, "jd"));
    }

    #[test]
    fn test_context_text_changes_digest() {
        let doc = b"resume";
        assert_ne!(fingerprint(doc, ""), fingerprint(doc, "Backend Engineer"));
    }

    #[test]
    fn test_is_lowercase_hex_of_fixed_length() {
        let fp = fingerprint(&[], "");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(fp.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[tokio::test]
    async fn test_file_fingerprint_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, b"pdf bytes").unwrap();
        let fp = fingerprint_file(&path, "jd").await.unwrap();
        assert_eq!(fp, fingerprint(b"pdf bytes", "jd"));
    }
}
