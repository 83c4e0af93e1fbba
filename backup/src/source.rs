//! The upstream consumer seam.
//!
//! The pipeline pulls `(record, cursor)` pairs from a [`RecordSource`] and
//! acknowledges consumption through a [`CursorCommitter`]. The Kafka-side
//! consumer driver implements both outside this repository; the
//! [`JsonFileSource`] here lets the binary and the tests run the real
//! pipeline without a cluster.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::error::{Error, Result};
use crate::model::ReducedRecord;

/// An ordered stream of consumer records with commit cursors.
///
/// Records must arrive in non-decreasing timestamp order; the pipeline
/// treats a decrease as an invariant violation. `next_record` returning
/// `None` means the upstream is exhausted.
#[async_trait]
pub trait RecordSource: Send {
    /// Opaque token sufficient to mark a record as consumed.
    type Cursor: Send + 'static;

    /// Pulls the next record, or `None` at end of input.
    async fn next_record(&mut self) -> Result<Option<(ReducedRecord, Self::Cursor)>>;
}

/// Commits consumed-record cursors back to the upstream.
///
/// Called by the storage sink once all bytes of the record carrying the
/// cursor are durably acknowledged, in record order.
#[async_trait]
pub trait CursorCommitter<C>: Send + Sync {
    async fn commit(&self, cursor: C) -> Result<()>;
}

/// Development source reading newline-delimited [`ReducedRecord`] JSON from
/// a file. The cursor is the zero-based line number.
pub struct JsonFileSource {
    lines: Lines<BufReader<File>>,
    line_no: u64,
}

impl JsonFileSource {
    /// Opens a newline-delimited JSON record file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())
            .await
            .map_err(|e| Error::Source(format!("cannot open record file: {}", e)))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

#[async_trait]
impl RecordSource for JsonFileSource {
    type Cursor = u64;

    async fn next_record(&mut self) -> Result<Option<(ReducedRecord, u64)>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| Error::Source(e.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };
            let cursor = self.line_no;
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReducedRecord = serde_json::from_str(&line)
                .map_err(|e| Error::Source(format!("bad record on line {}: {}", cursor, e)))?;
            return Ok(Some((record, cursor)));
        }
    }
}

/// Committer that records the consumed frontier in the log.
///
/// Stands in for a real consumer-group commit when running from a file.
#[derive(Debug, Default)]
pub struct LoggingCommitter;

#[async_trait]
impl CursorCommitter<u64> for LoggingCommitter {
    async fn commit(&self, cursor: u64) -> Result<()> {
        tracing::debug!(cursor, "cursor committed");
        Ok(())
    }
}
