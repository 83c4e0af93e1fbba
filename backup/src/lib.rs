//! Continuous topic backup into object storage.
//!
//! The `backup` crate streams consumer records from a message-log topic into
//! object storage as a sequence of time-sliced JSON arrays, optionally
//! gzip-compressed. Records are partitioned into buckets by timestamp, each
//! bucket becomes one object written through a resumable multipart upload,
//! and consumer cursors are committed only once the bytes carrying them are
//! durably acknowledged.
//!
//! # Architecture
//!
//! The pipeline is a single demand-driven chain of pull-based stages:
//!
//! - [`bucket`]: tags records with a bucket index derived from the configured
//!   time policy and inserts boundary markers where the index increases.
//! - [`framing`]: turns each bucket's records into byte chunks forming
//!   exactly one well-formed JSON array, one chunk per record.
//! - [`resume`]: at each bucket start, reconciles against uploads a previous
//!   run left in progress (resuming the current object or terminating the
//!   previous one).
//! - [`compress`]: optional per-chunk gzip, honouring whatever encoding an
//!   in-progress object was started with.
//! - [`sink`]: buffers chunks into parts, uploads them in order, and commits
//!   cursors as their bytes are acknowledged.
//! - [`pipeline`]: wires the stages together and exposes the control handle.
//!
//! # Delivery guarantees
//!
//! At-least-once: every consumed record lands in its bucket's object before
//! its cursor is committed, so a crash replays only uncommitted records.
//! An interrupted bucket is left as an in-progress upload and repaired or
//! resumed by the next run.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use backup::{BackupConfig, BackupPipeline};
//! use common::create_upload_store;
//!
//! let config = BackupConfig::default();
//! let store = create_upload_store(&config.storage).await?;
//! let handle = BackupPipeline::new(config, source, committer, store).start();
//! let mut results = handle.subscribe();
//! // ... await results, shut down via handle.shutdown() ...
//! ```

mod bucket;
mod compress;
#[cfg(test)]
mod testing;
mod config;
mod error;
mod framing;
mod key;
mod model;
mod pipeline;
mod resume;
mod sink;
mod source;

pub use config::{BackupConfig, CompressionConfig, TimeConfiguration, TimeUnit};
pub use error::{Error, Result};
pub use model::{BackupResult, ChunkContext, RecordElement, ReducedRecord};
pub use pipeline::{BackupHandle, BackupPipeline};
pub use source::{CursorCommitter, JsonFileSource, LoggingCommitter, RecordSource};
