//! Content hashing.
//!
//! The ingest backend dedupes by MD5 of the original source bytes, so the
//! digest is always computed on the pre-preprocess content.

use crate::error::{ErrorKind, Result};
use std::path::Path;

/// MD5 of a file's contents as lowercase hex.
pub(crate) async fn md5_of(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(ErrorKind::Io)?;
    Ok(format!("{:x}", md5::compute(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(md5_of(&path).await.unwrap(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(md5_of(&dir.path().join("nope")).await.is_err());
    }
}
