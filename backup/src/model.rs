//! Core data types for the backup pipeline.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A reduced consumer record, the unit of data written to backup objects.
///
/// Carries only the fields a restore needs; headers and broker-side metadata
/// are dropped at the consumer seam. The timestamp is the sole input to
/// bucketing and is expected to be non-decreasing along the stream.
///
/// Binary key and value payloads are carried base64-encoded so the record
/// serialises to a self-contained JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducedRecord {
    /// Topic the record was consumed from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Record key, base64-encoded. `None` for keyless records.
    pub key: Option<String>,
    /// Record payload, base64-encoded.
    pub value: String,
    /// Record timestamp in milliseconds since the epoch.
    pub timestamp: i64,
}

impl ReducedRecord {
    /// Builds a record from raw consumer payloads, base64-encoding the
    /// binary fields.
    pub fn from_raw(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Option<&[u8]>,
        value: &[u8],
        timestamp: i64,
    ) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: key.map(|k| engine.encode(k)),
            value: engine.encode(value),
            timestamp,
        }
    }
}

/// An element of the boundary-detected record stream.
///
/// `End` is inserted between two records whose bucket indices differ; it
/// carries no cursor because the record before it already carried the last
/// cursor of the closed bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordElement<C> {
    Element(ReducedRecord, C),
    End,
}

/// Context attached to each framed byte chunk.
///
/// Exactly one `Start` opens every bucket; it names the object key the
/// bucket's bytes belong under. Every chunk carries the cursor of the record
/// it serialises, committed once the chunk's bytes are acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkContext<C> {
    Start { cursor: C, key: String },
    Tail { cursor: C },
}

impl<C> ChunkContext<C> {
    /// Consumes the context, yielding the cursor it carries.
    pub fn into_cursor(self) -> C {
        match self {
            ChunkContext::Start { cursor, .. } => cursor,
            ChunkContext::Tail { cursor } => cursor,
        }
    }
}

/// A framed byte chunk paired with its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<C> {
    pub data: Bytes,
    pub context: ChunkContext<C>,
}

/// Outcome of one completed backup object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    /// Key of the completed object.
    pub key: String,
    /// Size of the stored object in bytes.
    pub object_size: u64,
}

impl From<common::CompletedObject> for BackupResult {
    fn from(completed: common::CompletedObject) -> Self {
        Self {
            key: completed.key,
            object_size: completed.size,
        }
    }
}
