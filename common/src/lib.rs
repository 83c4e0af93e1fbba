//! Shared storage abstractions for the backup tooling.
//!
//! The `common` crate defines the seam between the streaming pipelines and
//! object storage: the [`UploadStore`] trait modelling resumable multipart
//! uploads, its configuration types, and the in-repo backends (in-memory and
//! local filesystem). Cloud adapters (S3, GCS) implement the same trait
//! outside this repository.

pub mod storage;

pub use storage::config::{LocalStorageConfig, StorageConfig};
pub use storage::factory::create_upload_store;
pub use storage::{
    CompletedObject, CompressionKind, InMemoryUploadStore, InProgressUpload, LocalUploadStore,
    ObjectMetadata, StorageError, StorageResult, UploadState, UploadStore,
};
