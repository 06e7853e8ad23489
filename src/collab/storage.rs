use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::collab::ObjectStorage;
use crate::error::{DrmError, Result};

/// Filesystem-backed object storage.
///
/// Layout under the configured root: staged plaintext at `raw/{object_id}`,
/// encrypted blobs at `protected/{object_id}/{uuid}.bin`. Storage references
/// are paths relative to the root.
#[derive(Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, storage_ref: &str) -> Result<PathBuf> {
        // storage refs are server-generated, but they do round-trip through
        // the database; refuse anything that could escape the root
        if storage_ref.split('/').any(|part| part == "..") || Path::new(storage_ref).is_absolute() {
            return Err(DrmError::Validation(format!(
                "invalid storage ref: {storage_ref}"
            )));
        }
        Ok(self.root.join(storage_ref))
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn load_raw_bytes(&self, object_id: Uuid) -> Result<Vec<u8>> {
        let path = self.root.join("raw").join(object_id.to_string());
        Ok(tokio::fs::read(&path).await?)
    }

    async fn store_encrypted_bytes(&self, object_id: Uuid, bytes: &[u8]) -> Result<String> {
        let dir = self.root.join("protected").join(object_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let storage_ref = format!("protected/{}/{}.bin", object_id, Uuid::new_v4());
        tokio::fs::write(self.root.join(&storage_ref), bytes).await?;

        tracing::debug!("Stored encrypted blob at {}", storage_ref);
        Ok(storage_ref)
    }

    async fn remove_encrypted_bytes(&self, _object_id: Uuid, storage_ref: &str) -> Result<()> {
        let path = self.resolve(storage_ref)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}
