//! Local filesystem implementation of the upload store.
//!
//! Completed objects live directly under the root directory, named by their
//! key. In-progress uploads are staged under `.uploads/<upload-id>/` as a
//! `meta.json` plus one numbered `.part` file per uploaded part, so an
//! interrupted run leaves its staged parts on disk for the next run to
//! discover.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    CompletedObject, CompressionKind, InProgressUpload, ObjectMetadata, StorageError,
    StorageResult, UploadState, UploadStore,
};

const UPLOADS_DIR: &str = ".uploads";
const META_FILE: &str = "meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct UploadMeta {
    key: String,
    metadata: ObjectMetadata,
}

/// Filesystem-backed upload store rooted at a directory.
pub struct LocalUploadStore {
    root: PathBuf,
}

impl LocalUploadStore {
    /// Opens a store rooted at `path`, creating the directory layout if
    /// needed.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let root = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(UPLOADS_DIR))
            .await
            .map_err(StorageError::from_storage)?;
        Ok(Self { root })
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(upload_id)
    }

    async fn read_meta(&self, upload_id: &str) -> StorageResult<UploadMeta> {
        let raw = tokio::fs::read(self.upload_dir(upload_id).join(META_FILE))
            .await
            .map_err(|_| StorageError::UnknownUpload(upload_id.to_string()))?;
        serde_json::from_slice(&raw).map_err(StorageError::from_storage)
    }

    /// Returns the part file names of an upload in upload order.
    async fn part_files(&self, upload_id: &str) -> StorageResult<Vec<PathBuf>> {
        let dir = self.upload_dir(upload_id);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|_| StorageError::UnknownUpload(upload_id.to_string()))?;
        let mut parts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageError::from_storage)?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "part") {
                parts.push(path);
            }
        }
        // Part files are zero-padded so lexicographic order is upload order.
        parts.sort();
        Ok(parts)
    }
}

#[async_trait]
impl UploadStore for LocalUploadStore {
    async fn list_in_progress(&self) -> StorageResult<Vec<InProgressUpload>> {
        let mut entries = tokio::fs::read_dir(self.root.join(UPLOADS_DIR))
            .await
            .map_err(StorageError::from_storage)?;
        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageError::from_storage)?
        {
            let upload_id = entry.file_name().to_string_lossy().to_string();
            let meta = self.read_meta(&upload_id).await?;
            found.push(InProgressUpload {
                state: UploadState {
                    upload_id,
                    key: meta.key,
                },
                metadata: meta.metadata,
            });
        }
        found.sort_by(|a, b| a.state.upload_id.cmp(&b.state.upload_id));
        Ok(found)
    }

    #[tracing::instrument(level = "debug", skip(self, metadata))]
    async fn begin_upload(
        &self,
        key: &str,
        metadata: ObjectMetadata,
    ) -> StorageResult<UploadState> {
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&upload_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(StorageError::from_storage)?;
        let meta = UploadMeta {
            key: key.to_string(),
            metadata,
        };
        let raw = serde_json::to_vec(&meta).map_err(StorageError::from_storage)?;
        tokio::fs::write(dir.join(META_FILE), raw)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(UploadState {
            upload_id,
            key: key.to_string(),
        })
    }

    async fn upload_part(&self, state: &UploadState, data: Bytes) -> StorageResult<()> {
        let next = self.part_files(&state.upload_id).await?.len();
        let path = self
            .upload_dir(&state.upload_id)
            .join(format!("{:08}.part", next));
        tokio::fs::write(path, &data)
            .await
            .map_err(StorageError::from_storage)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn complete_upload(&self, state: &UploadState) -> StorageResult<CompletedObject> {
        let meta = self.read_meta(&state.upload_id).await?;
        let mut data = BytesMut::new();
        for part in self.part_files(&state.upload_id).await? {
            let bytes = tokio::fs::read(part)
                .await
                .map_err(StorageError::from_storage)?;
            data.extend_from_slice(&bytes);
        }
        let size = data.len() as u64;
        tokio::fs::write(self.root.join(&meta.key), &data)
            .await
            .map_err(StorageError::from_storage)?;
        tokio::fs::remove_dir_all(self.upload_dir(&state.upload_id))
            .await
            .map_err(StorageError::from_storage)?;
        Ok(CompletedObject {
            key: meta.key,
            size,
        })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Option<Bytes>> {
        match tokio::fs::read(self.root.join(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_storage(e)),
        }
    }

    async fn list_objects(&self) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(StorageError::from_storage)?;
        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageError::from_storage)?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == UPLOADS_DIR {
                continue;
            }
            keys.push(name);
        }
        keys.sort();
        Ok(keys)
    }
}
