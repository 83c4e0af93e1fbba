//! In-memory implementation of the upload store.
//!
//! Keeps uploads and completed objects in process memory. Used by tests and
//! development setups; the extra inspection helpers expose staged upload
//! bytes so crash/resume behaviour can be asserted without a real store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{
    CompletedObject, InProgressUpload, ObjectMetadata, StorageError, StorageResult, UploadState,
    UploadStore,
};

struct PendingUpload {
    key: String,
    metadata: ObjectMetadata,
    parts: Vec<Bytes>,
}

#[derive(Default)]
struct Inner {
    /// In-progress uploads by upload id.
    uploads: HashMap<String, PendingUpload>,
    /// Completed objects by key. BTreeMap keeps listing in key order.
    objects: BTreeMap<String, Bytes>,
    next_upload_id: u64,
}

/// In-memory upload store.
#[derive(Default)]
pub struct InMemoryUploadStore {
    inner: Mutex<Inner>,
}

impl InMemoryUploadStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the concatenated bytes staged so far for an in-progress
    /// upload under `key`, if one exists.
    pub fn staged_bytes(&self, key: &str) -> Option<Bytes> {
        let inner = self.inner.lock().unwrap();
        inner
            .uploads
            .values()
            .find(|u| u.key == key)
            .map(|u| concat_parts(&u.parts))
    }

    /// Returns the part sizes of the in-progress upload under `key`.
    pub fn staged_part_sizes(&self, key: &str) -> Option<Vec<usize>> {
        let inner = self.inner.lock().unwrap();
        inner
            .uploads
            .values()
            .find(|u| u.key == key)
            .map(|u| u.parts.iter().map(|p| p.len()).collect())
    }

    /// Seeds an in-progress upload, as if a previous run had crashed after
    /// staging `parts`.
    pub fn seed_in_progress(&self, key: &str, metadata: ObjectMetadata, parts: Vec<Bytes>) {
        let mut inner = self.inner.lock().unwrap();
        let upload_id = format!("upload-{}", inner.next_upload_id);
        inner.next_upload_id += 1;
        inner.uploads.insert(
            upload_id,
            PendingUpload {
                key: key.to_string(),
                metadata,
                parts,
            },
        );
    }
}

fn concat_parts(parts: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::new();
    for part in parts {
        buf.extend_from_slice(part);
    }
    buf.freeze()
}

#[async_trait]
impl UploadStore for InMemoryUploadStore {
    async fn list_in_progress(&self) -> StorageResult<Vec<InProgressUpload>> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<InProgressUpload> = inner
            .uploads
            .iter()
            .map(|(id, upload)| InProgressUpload {
                state: UploadState {
                    upload_id: id.clone(),
                    key: upload.key.clone(),
                },
                metadata: upload.metadata.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.state.upload_id.cmp(&b.state.upload_id));
        Ok(found)
    }

    async fn begin_upload(
        &self,
        key: &str,
        metadata: ObjectMetadata,
    ) -> StorageResult<UploadState> {
        let mut inner = self.inner.lock().unwrap();
        let upload_id = format!("upload-{}", inner.next_upload_id);
        inner.next_upload_id += 1;
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                metadata,
                parts: Vec::new(),
            },
        );
        Ok(UploadState {
            upload_id,
            key: key.to_string(),
        })
    }

    async fn upload_part(&self, state: &UploadState, data: Bytes) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let upload = inner
            .uploads
            .get_mut(&state.upload_id)
            .ok_or_else(|| StorageError::UnknownUpload(state.upload_id.clone()))?;
        upload.parts.push(data);
        Ok(())
    }

    async fn complete_upload(&self, state: &UploadState) -> StorageResult<CompletedObject> {
        let mut inner = self.inner.lock().unwrap();
        let upload = inner
            .uploads
            .remove(&state.upload_id)
            .ok_or_else(|| StorageError::UnknownUpload(state.upload_id.clone()))?;
        let data = concat_parts(&upload.parts);
        let size = data.len() as u64;
        let key = upload.key;
        inner.objects.insert(key.clone(), data);
        Ok(CompletedObject { key, size })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.objects.get(key).cloned())
    }

    async fn list_objects(&self) -> StorageResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.objects.keys().cloned().collect())
    }
}
