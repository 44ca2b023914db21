use async_trait::async_trait;
use log::{error, info};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed blob storage for uploaded thumbnails.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, hash: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;
    /// Returns the bytes and the sniffed MIME type.
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
}

pub fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

fn valid_hash(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Stores each blob at `<root>/<first two hex chars>/<hash>`.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("upload store rooted at '{}'", root.display());
        Self { root }
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join(&hash[0..2]).join(hash)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, hash: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        if !valid_hash(hash) {
            return Err(ImageStoreError::Other(format!("malformed hash '{hash}'")));
        }
        let path = self.path_for(hash);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ImageStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                error!("create_dir_all failed for '{}': {e}", dir.display());
                ImageStoreError::Other(e.to_string())
            })?;
        }
        // blobs appear under their final name only once fully written
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes).await.map_err(|e| ImageStoreError::Other(e.to_string()))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            error!("rename failed hash={hash}: {e}");
            ImageStoreError::Other(e.to_string())
        })
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        if !valid_hash(hash) {
            return Err(ImageStoreError::NotFound);
        }
        let bytes = tokio::fs::read(self.path_for(hash)).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImageStoreError::NotFound,
            _ => ImageStoreError::Other(e.to_string()),
        })?;
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "ab0000000000000000000000000000000000000000000000000000000000ffff";

    #[tokio::test]
    async fn save_then_load_and_detect_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());
        store.save(HASH, b"GIF89a....").await.unwrap();
        assert!(matches!(store.save(HASH, b"GIF89a....").await, Err(ImageStoreError::Duplicate)));
        let (bytes, mime) = store.load(HASH).await.unwrap();
        assert_eq!(bytes, b"GIF89a....");
        assert_eq!(mime, "image/gif");
    }

    #[tokio::test]
    async fn rejects_path_like_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());
        assert!(matches!(store.load("../etc/passwd").await, Err(ImageStoreError::NotFound)));
        assert!(store.save("..", b"x").await.is_err());
    }
}
