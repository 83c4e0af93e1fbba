//! Optional gzip compression of framed chunks.
//!
//! Compression is applied per chunk, after framing: every chunk becomes a
//! complete gzip member, and gzip members concatenate into a valid stream.
//! An interrupted upload therefore always holds a decodable prefix no matter
//! where it stopped, and resuming with a different level (or after a config
//! change, per the resume table) never corrupts the object.
//!
//! Framing decisions (`[`, `,`, `]`) are made on the uncompressed text; the
//! compressor only ever sees whole chunks.

use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;

use common::{CompressionKind, ObjectMetadata};

use crate::config::CompressionConfig;
use crate::error::{Error, Result};

/// Per-object chunk transform, fixed when the object is opened.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkCompressor {
    mode: Option<Compression>,
}

impl ChunkCompressor {
    fn passthrough() -> Self {
        Self { mode: None }
    }

    fn gzip(level: Option<u32>) -> Self {
        Self {
            mode: Some(level.map(Compression::new).unwrap_or_default()),
        }
    }

    /// Chooses the transform for a freshly begun object.
    pub(crate) fn for_new_object(configured: &CompressionConfig) -> Self {
        match configured {
            CompressionConfig::None => Self::passthrough(),
            CompressionConfig::Gzip { level } => Self::gzip(*level),
        }
    }

    /// Chooses the transform for the remainder of a resumed object.
    ///
    /// The object's existing bytes win over the run's configuration: a gzip
    /// run appending to an uncompressed object stays uncompressed for this
    /// object (and vice versa, with the encoder default level). The next
    /// object follows the configuration again.
    pub(crate) fn for_resumed_object(
        configured: &CompressionConfig,
        started_with: &ObjectMetadata,
    ) -> Self {
        match (configured, started_with.compression) {
            (CompressionConfig::Gzip { level }, Some(CompressionKind::Gzip)) => {
                Self::gzip(*level)
            }
            (CompressionConfig::Gzip { .. }, None) => {
                tracing::warn!(
                    "resuming an object that was started uncompressed; \
                     remaining chunks stay uncompressed despite gzip being configured"
                );
                Self::passthrough()
            }
            (CompressionConfig::None, Some(CompressionKind::Gzip)) => {
                tracing::warn!(
                    "resuming an object that was started gzip-compressed; \
                     remaining chunks use gzip at the default level"
                );
                Self::gzip(None)
            }
            (CompressionConfig::None, None) => Self::passthrough(),
        }
    }

    /// Transforms one chunk.
    pub(crate) fn transform(&self, data: Bytes) -> Result<Bytes> {
        match self.mode {
            None => Ok(data),
            Some(level) => gzip_member(&data, level),
        }
    }
}

/// Encodes `data` as one complete gzip member.
pub(crate) fn gzip_member(data: &[u8], level: Compression) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), level);
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map(Bytes::from)
        .map_err(|e| Error::UnhandledStreamCase(format!("gzip encoder failed: {}", e)))
}
