//! The object-upload storage seam.
//!
//! This module defines [`UploadStore`], the trait through which the backup
//! pipeline talks to object storage. The trait models exactly the multipart
//! surface the pipeline needs: enumerate in-progress uploads, open or resume
//! one, append parts in order, and finalise into a completed object.
//!
//! Implementations must make `upload_part` return only once the part is
//! durably accepted by the backing store; the pipeline commits consumer
//! cursors on the strength of that acknowledgement. Transient part failures
//! are retried inside the implementation (per the backing SDK's policy) and
//! surface as [`StorageError`] only once retries are exhausted.

pub mod config;
pub mod factory;
pub mod in_memory;
pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use in_memory::InMemoryUploadStore;
pub use local::LocalUploadStore;

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by storage backends.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// The backing store refused or failed an operation.
    Storage(String),
    /// An upload handle referred to an upload the store does not know about.
    UnknownUpload(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "storage failure: {}", msg),
            StorageError::UnknownUpload(id) => write!(f, "unknown upload: {}", id),
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    /// Wraps any displayable error as a generic storage failure.
    pub fn from_storage(e: impl std::fmt::Display) -> Self {
        StorageError::Storage(e.to_string())
    }
}

/// Compression applied to an object's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionKind {
    Gzip,
}

/// Metadata persisted alongside an in-progress upload.
///
/// Recorded when the upload begins and recovered together with the upload
/// state, so a later run knows how the object's existing bytes were encoded
/// even if the run's own configuration has changed in the meantime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Compression the upload was started with, if any.
    pub compression: Option<CompressionKind>,
}

/// Opaque handle identifying an in-progress multipart upload.
///
/// Produced by [`UploadStore::begin_upload`] or recovered via
/// [`UploadStore::list_in_progress`]. Carried by value through the pipeline
/// and never mutated by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadState {
    /// Backend-assigned upload identifier.
    pub upload_id: String,
    /// Object key the upload writes to.
    pub key: String,
}

/// An in-progress upload discovered in storage.
#[derive(Debug, Clone)]
pub struct InProgressUpload {
    pub state: UploadState,
    pub metadata: ObjectMetadata,
}

/// A finalised object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedObject {
    /// The object's key.
    pub key: String,
    /// Total size of the stored object in bytes.
    pub size: u64,
}

/// Resumable multipart uploads into object storage.
///
/// Parts are appended strictly in order by a single writer; implementations
/// may therefore number parts by arrival. An upload that is never completed
/// must remain discoverable through [`list_in_progress`] so a later run can
/// resume or terminate it.
///
/// [`list_in_progress`]: UploadStore::list_in_progress
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Enumerates uploads that have been begun but not completed.
    async fn list_in_progress(&self) -> StorageResult<Vec<InProgressUpload>>;

    /// Begins a new multipart upload under `key`.
    async fn begin_upload(&self, key: &str, metadata: ObjectMetadata)
        -> StorageResult<UploadState>;

    /// Appends one part to an upload.
    ///
    /// Returns once the part is durably accepted. Parts are stored in the
    /// order they arrive.
    async fn upload_part(&self, state: &UploadState, data: Bytes) -> StorageResult<()>;

    /// Completes an upload, making the object visible under its key.
    async fn complete_upload(&self, state: &UploadState) -> StorageResult<CompletedObject>;

    /// Reads a completed object. Returns `None` if no such object exists.
    ///
    /// In-progress uploads are not visible through this method.
    async fn get_object(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Lists the keys of completed objects in lexicographic order.
    async fn list_objects(&self) -> StorageResult<Vec<String>>;
}
