//! Streaming JSON framing.
//!
//! Turns each bucket's element sequence into byte chunks forming exactly one
//! well-formed JSON array. Chunks pair 1:1 with records (and therefore with
//! cursors); the framer never merges bytes across record boundaries.
//!
//! Whether a record's serialisation ends in `,` or `]` depends on what
//! follows it, so the framer holds one element back and emits its chunk when
//! the next stream event is known:
//!
//! - next is another record: `serialise(r) + ","`
//! - next is a bucket boundary: `serialise(r) + "]"` (array closed)
//! - upstream exhausted: `serialise(r) + ","`. The dangling comma is
//!   intentional; a later run either appends more records to the open object
//!   or repairs it by terminating with `null]`.
//!
//! The first chunk of a bucket additionally carries a leading `[` and is
//! tagged `Start` with the object key derived from that record.

use common::CompressionKind;

use crate::bucket::BoundaryStream;
use crate::config::TimeConfiguration;
use crate::error::{Error, Result};
use crate::key::calculate_key;
use crate::model::{Chunk, ChunkContext, RecordElement, ReducedRecord};
use crate::source::RecordSource;

/// One step of the framed stream.
#[derive(Debug)]
pub(crate) enum FrameEvent<C> {
    /// A byte chunk belonging to the currently open bucket.
    Chunk(Chunk<C>),
    /// The open bucket's array was closed; its object can be finalised.
    BucketComplete,
    /// The upstream is exhausted. If a bucket was open, its last chunk ended
    /// with a comma and its object must be left in progress.
    SourceDrained,
}

pub(crate) struct FrameStream<S: RecordSource> {
    boundary: BoundaryStream<S>,
    time: TimeConfiguration,
    compression: Option<CompressionKind>,
    held: Option<(ReducedRecord, S::Cursor)>,
    at_start: bool,
    pending: Option<FrameEvent<S::Cursor>>,
    drained: bool,
}

impl<S: RecordSource> FrameStream<S> {
    pub(crate) fn new(
        source: S,
        time: TimeConfiguration,
        compression: Option<CompressionKind>,
    ) -> Self {
        Self {
            boundary: BoundaryStream::new(source, time.clone()),
            time,
            compression,
            held: None,
            at_start: true,
            pending: None,
            drained: false,
        }
    }

    pub(crate) async fn next(&mut self) -> Result<FrameEvent<S::Cursor>> {
        if let Some(event) = self.pending.take() {
            if matches!(event, FrameEvent::BucketComplete) {
                self.at_start = true;
            }
            return Ok(event);
        }
        if self.drained {
            return Ok(FrameEvent::SourceDrained);
        }
        loop {
            match self.boundary.next().await? {
                Some(RecordElement::Element(record, cursor)) => {
                    if let Some((held_record, held_cursor)) =
                        self.held.replace((record, cursor))
                    {
                        return self.element_chunk(held_record, held_cursor, b",");
                    }
                    // First element of a bucket: hold it until the next
                    // event tells us how its chunk ends.
                }
                Some(RecordElement::End) => {
                    let (held_record, held_cursor) = self.held.take().ok_or_else(|| {
                        Error::UnhandledStreamCase(
                            "bucket boundary without a preceding record".to_string(),
                        )
                    })?;
                    self.pending = Some(FrameEvent::BucketComplete);
                    return self.element_chunk(held_record, held_cursor, b"]");
                }
                None => {
                    self.drained = true;
                    if let Some((held_record, held_cursor)) = self.held.take() {
                        self.pending = Some(FrameEvent::SourceDrained);
                        return self.element_chunk(held_record, held_cursor, b",");
                    }
                    return Ok(FrameEvent::SourceDrained);
                }
            }
        }
    }

    fn element_chunk(
        &mut self,
        record: ReducedRecord,
        cursor: S::Cursor,
        suffix: &[u8],
    ) -> Result<FrameEvent<S::Cursor>> {
        let mut data = Vec::with_capacity(128);
        if self.at_start {
            data.push(b'[');
        }
        serde_json::to_writer(&mut data, &record)
            .map_err(|e| Error::UnhandledStreamCase(format!("record failed to serialise: {}", e)))?;
        data.extend_from_slice(suffix);

        let context = if self.at_start {
            self.at_start = false;
            let key = calculate_key(record.timestamp, &self.time, self.compression)?;
            ChunkContext::Start { cursor, key }
        } else {
            ChunkContext::Tail { cursor }
        };
        Ok(FrameEvent::Chunk(Chunk {
            data: data.into(),
            context,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record_at, ScriptedSource};

    fn period_1s() -> TimeConfiguration {
        TimeConfiguration::PeriodFromFirst { period_ms: 1_000 }
    }

    async fn collect(
        records: Vec<ReducedRecord>,
        time: TimeConfiguration,
    ) -> Vec<FrameEvent<u64>> {
        let mut stream = FrameStream::new(ScriptedSource::new(records), time, None);
        let mut events = Vec::new();
        loop {
            let event = stream.next().await.unwrap();
            let done = matches!(event, FrameEvent::SourceDrained);
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    fn chunk_text(event: &FrameEvent<u64>) -> String {
        match event {
            FrameEvent::Chunk(chunk) => String::from_utf8(chunk.data.to_vec()).unwrap(),
            other => panic!("expected chunk, got {:?}", other),
        }
    }

    fn record_json(timestamp: i64) -> String {
        serde_json::to_string(&record_at(timestamp)).unwrap()
    }

    #[tokio::test]
    async fn should_close_single_record_bucket_when_boundary_follows() {
        // given: 0 closes its bucket because 1500 opens the next
        let events = collect(vec![record_at(0), record_at(1_500)], period_1s()).await;

        // then: rule 1 for the first bucket, rule 2 for the trailing one
        assert_eq!(chunk_text(&events[0]), format!("[{}]", record_json(0)));
        assert!(matches!(events[1], FrameEvent::BucketComplete));
        assert_eq!(chunk_text(&events[2]), format!("[{},", record_json(1_500)));
        assert!(matches!(events[3], FrameEvent::SourceDrained));
    }

    #[tokio::test]
    async fn should_leave_dangling_comma_at_end_of_input() {
        // given: a single record and no boundary
        let events = collect(vec![record_at(1_000)], period_1s()).await;

        // then: the array is left open for a later run to resume or repair
        assert_eq!(chunk_text(&events[0]), format!("[{},", record_json(1_000)));
        assert!(matches!(events[1], FrameEvent::SourceDrained));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn should_emit_one_chunk_per_record_within_a_bucket() {
        // given: three records in one bucket, then a boundary
        let events = collect(
            vec![
                record_at(0),
                record_at(100),
                record_at(200),
                record_at(1_500),
            ],
            period_1s(),
        )
        .await;

        // then: "[r0," "r100," "r200]" complete, then the next bucket opens
        assert_eq!(chunk_text(&events[0]), format!("[{},", record_json(0)));
        assert_eq!(chunk_text(&events[1]), format!("{},", record_json(100)));
        assert_eq!(chunk_text(&events[2]), format!("{}]", record_json(200)));
        assert!(matches!(events[3], FrameEvent::BucketComplete));
        assert_eq!(chunk_text(&events[4]), format!("[{},", record_json(1_500)));
    }

    #[tokio::test]
    async fn should_tag_bucket_openers_as_start_with_derived_key() {
        // given
        let events = collect(vec![record_at(1_000), record_at(2_500)], period_1s()).await;

        // then: each bucket's first chunk is Start, keyed by its first record
        let FrameEvent::Chunk(first) = &events[0] else {
            panic!("expected chunk");
        };
        assert!(matches!(
            &first.context,
            ChunkContext::Start { key, .. } if key == "1970-01-01T00:00:01Z.json"
        ));
        let FrameEvent::Chunk(second_bucket) = &events[2] else {
            panic!("expected chunk");
        };
        assert!(matches!(
            &second_bucket.context,
            ChunkContext::Start { key, .. } if key == "1970-01-01T00:00:02.500Z.json"
        ));
    }

    #[tokio::test]
    async fn should_pair_cursors_with_their_records_chunks() {
        // given
        let events = collect(
            vec![record_at(0), record_at(100), record_at(1_500)],
            period_1s(),
        )
        .await;

        // then: cursor i travels with record i's chunk
        let cursors: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                FrameEvent::Chunk(chunk) => Some(match &chunk.context {
                    ChunkContext::Start { cursor, .. } => *cursor,
                    ChunkContext::Tail { cursor } => *cursor,
                }),
                _ => None,
            })
            .collect();
        assert_eq!(cursors, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn should_use_gzip_extension_when_configured() {
        // given
        let mut stream = FrameStream::new(
            ScriptedSource::new(vec![record_at(0)]),
            period_1s(),
            Some(CompressionKind::Gzip),
        );

        // when
        let event = stream.next().await.unwrap();

        // then
        let FrameEvent::Chunk(chunk) = event else {
            panic!("expected chunk");
        };
        assert!(matches!(
            chunk.context,
            ChunkContext::Start { ref key, .. } if key == "1970-01-01T00:00:00Z.json.gz"
        ));
    }
}
