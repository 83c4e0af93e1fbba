//! Bucket assignment and boundary detection.
//!
//! [`BucketTagger`] establishes the bucket anchor from the first consumed
//! record and tags every record with its bucket index. [`BoundaryStream`]
//! flattens the tagged stream into [`RecordElement`]s, inserting an `End`
//! marker exactly where the index increases.

use crate::config::TimeConfiguration;
use crate::error::{Error, Result};
use crate::key::BucketAnchor;
use crate::model::{RecordElement, ReducedRecord};
use crate::source::RecordSource;

/// Tags each record with the bucket index derived from its timestamp.
///
/// The anchor is fixed by the first record; from then on the index is a pure
/// function of the record timestamp. Fails with
/// [`Error::ExpectedStartOfSource`] if the upstream ends before yielding a
/// record.
pub(crate) struct BucketTagger<S: RecordSource> {
    source: S,
    time: TimeConfiguration,
    anchor: Option<BucketAnchor>,
}

impl<S: RecordSource> BucketTagger<S> {
    pub(crate) fn new(source: S, time: TimeConfiguration) -> Self {
        Self {
            source,
            time,
            anchor: None,
        }
    }

    pub(crate) async fn next(
        &mut self,
    ) -> Result<Option<(ReducedRecord, S::Cursor, i64)>> {
        let Some((record, cursor)) = self.source.next_record().await? else {
            if self.anchor.is_none() {
                return Err(Error::ExpectedStartOfSource);
            }
            return Ok(None);
        };
        let anchor = match self.anchor {
            Some(anchor) => anchor,
            None => {
                let anchor = BucketAnchor::from_first(record.timestamp, &self.time);
                self.anchor = Some(anchor);
                anchor
            }
        };
        let index = anchor.index_of(record.timestamp);
        Ok(Some((record, cursor, index)))
    }
}

/// Emits records interleaved with `End` markers at bucket boundaries.
///
/// A boundary holds between adjacent records iff the second one's bucket
/// index is strictly greater. Equal indices never produce `End`; a decrease
/// violates the monotonicity the upstream promises and surfaces as
/// [`Error::UnhandledStreamCase`].
pub(crate) struct BoundaryStream<S: RecordSource> {
    tagger: BucketTagger<S>,
    last_index: Option<i64>,
    /// Element queued behind an `End` marker that was emitted first.
    queued: Option<RecordElement<S::Cursor>>,
    exhausted: bool,
}

impl<S: RecordSource> BoundaryStream<S> {
    pub(crate) fn new(source: S, time: TimeConfiguration) -> Self {
        Self {
            tagger: BucketTagger::new(source, time),
            last_index: None,
            queued: None,
            exhausted: false,
        }
    }

    pub(crate) async fn next(&mut self) -> Result<Option<RecordElement<S::Cursor>>> {
        if let Some(element) = self.queued.take() {
            return Ok(Some(element));
        }
        if self.exhausted {
            return Ok(None);
        }
        let Some((record, cursor, index)) = self.tagger.next().await? else {
            self.exhausted = true;
            return Ok(None);
        };
        let element = RecordElement::Element(record, cursor);
        match self.last_index {
            None => {
                self.last_index = Some(index);
                Ok(Some(element))
            }
            Some(last) if index == last => Ok(Some(element)),
            Some(last) if index > last => {
                self.last_index = Some(index);
                self.queued = Some(element);
                Ok(Some(RecordElement::End))
            }
            Some(last) => Err(Error::UnhandledStreamCase(format!(
                "bucket index decreased from {} to {}",
                last, index
            ))),
        }
    }
}
