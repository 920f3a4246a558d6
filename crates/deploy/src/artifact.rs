//! Loading and identifying compiled program artifacts.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::ArtifactError;

/// An immutable compiled bytecode blob.
///
/// Identity is the SHA-256 hash of the content; the exact byte length drives
/// every sizing decision downstream.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
    bytes: Vec<u8>,
    hash: String,
}

impl Artifact {
    /// Load an artifact from disk, rejecting missing and empty files.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(ArtifactError::NotFound(path));
        }

        let bytes = std::fs::read(&path).map_err(|source| ArtifactError::Read {
            path: path.clone(),
            source,
        })?;

        if bytes.is_empty() {
            return Err(ArtifactError::Empty(path));
        }

        let hash = content_hash(&bytes);
        Ok(Self { path, bytes, hash })
    }

    /// Exact byte length of the artifact.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex-encoded SHA-256 hash of the content.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Hex-encoded SHA-256 hash of a byte slice.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_load_reads_length_and_hash() {
        let dir = TempDir::new("slipway-artifact").expect("Failed to create temp dir");
        let path = dir.path().join("program.so");
        std::fs::write(&path, [7u8; 1024]).expect("Failed to write artifact");

        let artifact = Artifact::load(&path).expect("Failed to load artifact");
        assert_eq!(artifact.len(), 1024);
        assert_eq!(artifact.hash(), content_hash(&[7u8; 1024]));
        assert_eq!(artifact.path(), path);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new("slipway-artifact").expect("Failed to create temp dir");
        let result = Artifact::load(dir.path().join("nope.so"));
        assert!(matches!(result, Err(ArtifactError::NotFound(_))));
    }

    #[test]
    fn test_load_empty_file() {
        let dir = TempDir::new("slipway-artifact").expect("Failed to create temp dir");
        let path = dir.path().join("empty.so");
        std::fs::write(&path, []).expect("Failed to write artifact");

        let result = Artifact::load(&path);
        assert!(matches!(result, Err(ArtifactError::Empty(_))));
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = content_hash(b"deploy me");
        let b = content_hash(b"deploy me");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert_ne!(a, content_hash(b"deploy me, but different"));
    }
}
