//! Reconciliation with uploads a previous run left in progress.
//!
//! Before a bucket's first chunk is written, the coordinator inspects the
//! store's in-progress uploads and decides how to open the bucket's object:
//!
//! - no in-progress upload: begin a fresh one;
//! - an upload under another key: a run crashed between buckets. Repair it
//!   by appending `null]` (closing its dangling comma) and completing it,
//!   then begin fresh;
//! - an upload under this bucket's key: a run crashed mid-bucket. Resume
//!   it, dropping the new stream's leading `[` since the array is already
//!   open in storage.
//!
//! Only the run's first bucket can encounter pre-existing uploads: every
//! later bucket opens strictly after its predecessor completed, so the
//! storage query is skipped from then on.

use std::sync::Arc;

use bytes::Bytes;
use flate2::Compression;

use common::{CompressionKind, InProgressUpload, ObjectMetadata, UploadState, UploadStore};

use crate::compress::{gzip_member, ChunkCompressor};
use crate::config::{CompressionConfig, TimeConfiguration};
use crate::error::{Error, Result};
use crate::key::key_stem;
use crate::model::BackupResult;

/// The bytes that close a dangling array: a sentinel `null` element plus the
/// closing bracket. Readers of backup objects must tolerate the trailing
/// `null`.
const TERMINATOR: &[u8] = b"null]";

/// How the sink should treat a bucket's object.
pub(crate) struct OpenedObject {
    pub state: UploadState,
    /// The object already holds an open array; drop the leading `[`.
    pub resumed: bool,
    /// Chunk transform for this object.
    pub compressor: ChunkCompressor,
}

/// Result of opening a bucket.
pub(crate) struct OpenOutcome {
    pub object: OpenedObject,
    /// A previous run's upload that was terminated on the way.
    pub terminated_previous: Option<BackupResult>,
}

pub(crate) struct ResumeCoordinator {
    store: Arc<dyn UploadStore>,
    time: TimeConfiguration,
    compression: CompressionConfig,
    first_bucket_checked: bool,
}

impl ResumeCoordinator {
    pub(crate) fn new(
        store: Arc<dyn UploadStore>,
        time: TimeConfiguration,
        compression: CompressionConfig,
    ) -> Self {
        Self {
            store,
            time,
            compression,
            first_bucket_checked: false,
        }
    }

    /// Opens the object for the bucket keyed by `key`.
    pub(crate) async fn open_bucket(&mut self, key: &str) -> Result<OpenOutcome> {
        if self.first_bucket_checked {
            return Ok(OpenOutcome {
                object: self.begin_fresh(key).await?,
                terminated_previous: None,
            });
        }
        self.first_bucket_checked = true;

        let (current, previous) = self.classify(key).await?;
        match (current, previous) {
            (Some(current), Some(previous)) => Err(Error::UnhandledStreamCase(format!(
                "both a current ({}) and a previous ({}) upload are in progress",
                current.state.key, previous.state.key
            ))),
            (None, None) => Ok(OpenOutcome {
                object: self.begin_fresh(key).await?,
                terminated_previous: None,
            }),
            (None, Some(previous)) => {
                if matches!(self.time, TimeConfiguration::PeriodFromFirst { .. }) {
                    tracing::warn!(
                        key = %previous.state.key,
                        "found an in-progress upload although period-anchored runs \
                         should have completed theirs; treating it as a previous bucket"
                    );
                }
                let terminated = self.terminate(previous).await?;
                Ok(OpenOutcome {
                    object: self.begin_fresh(key).await?,
                    terminated_previous: Some(terminated),
                })
            }
            (Some(current), None) => {
                if matches!(self.time, TimeConfiguration::PeriodFromFirst { .. }) {
                    return Err(Error::UnhandledStreamCase(format!(
                        "in-progress upload {} collides with a period-anchored key, \
                         which is unique per run",
                        current.state.key
                    )));
                }
                tracing::info!(key = %current.state.key, "resuming in-progress upload");
                Ok(OpenOutcome {
                    object: OpenedObject {
                        resumed: true,
                        compressor: ChunkCompressor::for_resumed_object(
                            &self.compression,
                            &current.metadata,
                        ),
                        state: current.state,
                    },
                    terminated_previous: None,
                })
            }
        }
    }

    /// Repairs a dangling upload when the upstream yielded no records at
    /// all, so no bucket will open this run.
    pub(crate) async fn terminate_dangling(&mut self) -> Result<Option<BackupResult>> {
        self.first_bucket_checked = true;
        let mut uploads = self.store.list_in_progress().await?;
        match uploads.len() {
            0 => Ok(None),
            1 => {
                let upload = uploads.remove(0);
                Ok(Some(self.terminate(upload).await?))
            }
            n => Err(Error::UnhandledStreamCase(format!(
                "{} uploads in progress; a single writer never leaves more than one",
                n
            ))),
        }
    }

    /// Classifies in-progress uploads against the bucket key.
    ///
    /// Keys are compared by timestamp stem so an object begun under a
    /// different compression configuration still counts as this bucket's.
    async fn classify(
        &self,
        key: &str,
    ) -> Result<(Option<InProgressUpload>, Option<InProgressUpload>)> {
        let stem = key_stem(key);
        let mut current = None;
        let mut previous = None;
        for upload in self.store.list_in_progress().await? {
            let slot = if key_stem(&upload.state.key) == stem {
                &mut current
            } else {
                &mut previous
            };
            if let Some(existing) = slot.replace(upload) {
                return Err(Error::UnhandledStreamCase(format!(
                    "multiple in-progress uploads contend for one slot: {}",
                    existing.state.key
                )));
            }
        }
        Ok((current, previous))
    }

    async fn begin_fresh(&self, key: &str) -> Result<OpenedObject> {
        let metadata = ObjectMetadata {
            compression: self.compression.kind(),
        };
        let state = self.store.begin_upload(key, metadata).await?;
        tracing::info!(key, "opened new backup object");
        Ok(OpenedObject {
            state,
            resumed: false,
            compressor: ChunkCompressor::for_new_object(&self.compression),
        })
    }

    /// Closes a dangling array with `null]` and completes its upload.
    async fn terminate(&self, upload: InProgressUpload) -> Result<BackupResult> {
        tracing::info!(
            key = %upload.state.key,
            "terminating in-progress upload from a previous run"
        );
        let closing = match upload.metadata.compression {
            Some(CompressionKind::Gzip) => gzip_member(TERMINATOR, Compression::default())?,
            None => Bytes::from_static(TERMINATOR),
        };
        self.store.upload_part(&upload.state, closing).await?;
        let completed = self.store.complete_upload(&upload.state).await?;
        Ok(BackupResult::from(completed))
    }
}
