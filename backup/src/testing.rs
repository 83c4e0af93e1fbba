//! Shared helpers for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ReducedRecord;
use crate::source::{CursorCommitter, RecordSource};

/// A record with the given timestamp; offset doubles as an identifier.
pub(crate) fn record_at(timestamp: i64) -> ReducedRecord {
    ReducedRecord::from_raw("events", 0, timestamp, None, b"v", timestamp)
}

/// Source yielding a fixed list of records; cursors are positions.
pub(crate) struct ScriptedSource {
    records: VecDeque<(ReducedRecord, u64)>,
}

impl ScriptedSource {
    pub(crate) fn new(records: Vec<ReducedRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .enumerate()
                .map(|(i, r)| (r, i as u64))
                .collect(),
        }
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    type Cursor = u64;

    async fn next_record(&mut self) -> Result<Option<(ReducedRecord, u64)>> {
        Ok(self.records.pop_front())
    }
}

/// Committer recording every committed cursor in order.
#[derive(Default)]
pub(crate) struct RecordingCommitter {
    committed: Mutex<Vec<u64>>,
}

impl RecordingCommitter {
    pub(crate) fn committed(&self) -> Vec<u64> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CursorCommitter<u64> for RecordingCommitter {
    async fn commit(&self, cursor: u64) -> Result<()> {
        self.committed.lock().unwrap().push(cursor);
        Ok(())
    }
}
