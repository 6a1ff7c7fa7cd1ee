// Filesystem media store - blobs live under one directory, named by
// content id with an extension matching the kind.

use crate::core::broadcast::{BroadcastError, ContentKind, MediaStore};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct FsMediaStore {
    dir: PathBuf,
}

impl FsMediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(
        &self,
        content_id: &str,
        kind: ContentKind,
        bytes: &[u8],
    ) -> Result<String, BroadcastError> {
        let ext = kind.media_extension().ok_or_else(|| {
            BroadcastError::Validation("text content has no media payload".to_string())
        })?;
        std::fs::create_dir_all(&self.dir).map_err(|e| BroadcastError::Storage(e.to_string()))?;
        let path = self.dir.join(format!("{}.{}", content_id, ext));
        std::fs::write(&path, bytes).map_err(|e| BroadcastError::Storage(e.to_string()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn remove(&self, blob_ref: &str) -> Result<(), BroadcastError> {
        match std::fs::remove_file(blob_ref) {
            Ok(()) => Ok(()),
            // Already gone is fine - deletion is idempotent.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BroadcastError::Storage(e.to_string())),
        }
    }
}
