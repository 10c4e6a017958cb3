//! Content-addressed output names.

use crate::error::{ConvertError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex digits of the hash kept in a file name.
pub const SHORT_HASH_LEN: usize = 8;

/// A file after renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashedFile {
    pub path: PathBuf,
    /// Full SHA-256, hex encoded
    pub hash: String,
    /// Size in bytes
    pub size: u64,
}

/// SHA-256 of `bytes`, hex encoded.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `<stem>-<hash8>.<ext>`, where the stem ends at the first dot of `file_name`.
///
/// A name without a dot gets no extension. `hash` must start with
/// [`SHORT_HASH_LEN`] hex digits.
pub fn content_hash_name(file_name: &str, hash: &str) -> Result<String> {
    let short = hash
        .get(..SHORT_HASH_LEN)
        .filter(|short| short.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| ConvertError::InvalidInput {
            message: format!("'{hash}' does not start with {SHORT_HASH_LEN} hex digits"),
        })?;
    Ok(match file_name.split_once('.') {
        Some((stem, ext)) => format!("{stem}-{short}.{ext}"),
        None => format!("{file_name}-{short}"),
    })
}

/// Hash a file's contents and rename it in place to its content-addressed name.
pub fn rename_with_hash(path: impl AsRef<Path>) -> Result<HashedFile> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| ConvertError::io(format!("reading {} for hashing", path.display()), e))?;
    let hash = content_hash(&bytes);

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConvertError::InvalidInput {
            message: format!("{} has no usable file name", path.display()),
        })?;
    let renamed = path.with_file_name(content_hash_name(file_name, &hash)?);
    std::fs::rename(path, &renamed).map_err(|e| {
        ConvertError::io(
            format!("renaming {} to {}", path.display(), renamed.display()),
            e,
        )
    })?;

    tracing::info!(path = %renamed.display(), hash = %hash, size = bytes.len(), "wrote");
    Ok(HashedFile {
        path: renamed,
        hash,
        size: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_known_value() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_name_splits_at_first_dot() {
        let name = |file: &str, hash: &str| content_hash_name(file, hash).unwrap();
        assert_eq!(name("model.yml", "0123456789ab"), "model-01234567.yml");
        assert_eq!(
            name("disc_model.safetensors", "deadbeefcafe"),
            "disc_model-deadbeef.safetensors"
        );
        assert_eq!(name("a.tar.gz", "ffffffffff"), "a-ffffffff.tar.gz");
        assert_eq!(name("README", "1234567890"), "README-12345678");
    }

    #[test]
    fn test_hash_name_rejects_short_or_non_hex_hash() {
        for hash in ["", "abc", "0123456", "0123456\u{e9}9", "zzzzzzzzzz"] {
            let err = content_hash_name("model.yml", hash).unwrap_err();
            assert_eq!(err.code(), "E041", "{hash}");
        }
        assert!(content_hash_name("model.yml", "01234567").is_ok());
    }

    #[test]
    fn test_rename_with_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vocab.json");
        std::fs::write(&path, b"abc").unwrap();

        let hashed = rename_with_hash(&path).unwrap();
        assert_eq!(hashed.path, tmp.path().join("vocab-ba7816bf.json"));
        assert_eq!(hashed.size, 3);
        assert!(!path.exists());
        assert_eq!(std::fs::read(&hashed.path).unwrap(), b"abc");
    }

    #[test]
    fn test_rename_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = rename_with_hash(tmp.path().join("nope.yml")).unwrap_err();
        assert_eq!(err.code(), "E050");
    }
}
