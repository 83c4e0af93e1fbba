//! Pipeline orchestration and the control handle.
//!
//! [`BackupPipeline`] composes the stages into one runnable loop processing
//! buckets strictly sequentially: a bucket's object is finalised before the
//! next bucket opens. The spawned task is controlled through
//! [`BackupHandle`]: cancelling drains the open bucket's buffered bytes and
//! leaves its upload in progress, so the next run can resume it.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use common::UploadStore;

use crate::compress::ChunkCompressor;
use crate::config::BackupConfig;
use crate::error::{Error, Result};
use crate::framing::{FrameEvent, FrameStream};
use crate::model::{BackupResult, ChunkContext};
use crate::resume::ResumeCoordinator;
use crate::sink::ObjectSink;
use crate::source::{CursorCommitter, RecordSource};

/// A configured, not-yet-running backup pipeline.
pub struct BackupPipeline<S: RecordSource> {
    config: BackupConfig,
    source: S,
    committer: Arc<dyn CursorCommitter<S::Cursor>>,
    store: Arc<dyn UploadStore>,
}

impl<S: RecordSource + 'static> BackupPipeline<S> {
    pub fn new(
        config: BackupConfig,
        source: S,
        committer: Arc<dyn CursorCommitter<S::Cursor>>,
        store: Arc<dyn UploadStore>,
    ) -> Self {
        Self {
            config,
            source,
            committer,
            store,
        }
    }

    /// Spawns the pipeline and returns its control handle.
    pub fn start(self) -> BackupHandle {
        let token = CancellationToken::new();
        let (results_tx, _) = broadcast::channel(64);
        let join = tokio::spawn(run(
            self.config,
            self.source,
            self.committer,
            self.store,
            token.clone(),
            results_tx.clone(),
        ));
        BackupHandle {
            token,
            results_tx,
            join,
        }
    }
}

/// Combined control and result handle for a running pipeline.
pub struct BackupHandle {
    token: CancellationToken,
    results_tx: broadcast::Sender<BackupResult>,
    join: JoinHandle<Result<()>>,
}

impl BackupHandle {
    /// Subscribes to completed-object notifications.
    ///
    /// New subscribers only receive results for objects completed after
    /// subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<BackupResult> {
        self.results_tx.subscribe()
    }

    /// Requests a graceful shutdown: the open bucket's buffered bytes are
    /// flushed and its upload is left in progress for the next run.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// The token cancelled by [`shutdown`](BackupHandle::shutdown). Clone it
    /// to wire external shutdown triggers such as signal handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for the pipeline to finish and returns its outcome.
    pub async fn wait(self) -> Result<()> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::UnhandledStreamCase(format!(
                "pipeline task failed: {}",
                e
            ))),
        }
    }
}

async fn run<S: RecordSource>(
    config: BackupConfig,
    source: S,
    committer: Arc<dyn CursorCommitter<S::Cursor>>,
    store: Arc<dyn UploadStore>,
    token: CancellationToken,
    results_tx: broadcast::Sender<BackupResult>,
) -> Result<()> {
    config.validate()?;
    let mut frames = FrameStream::new(source, config.time.clone(), config.compression.kind());
    let mut resume = ResumeCoordinator::new(
        store.clone(),
        config.time.clone(),
        config.compression.clone(),
    );
    let mut open: Option<(ObjectSink<S::Cursor>, ChunkCompressor)> = None;

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => {
                if let Some((sink, _)) = open.take() {
                    sink.flush_open().await?;
                }
                tracing::info!("backup pipeline cancelled");
                return Ok(());
            }
            event = frames.next() => event,
        };
        let event = match event {
            Ok(event) => event,
            Err(Error::ExpectedStartOfSource) => {
                // No bucket opens this run, but a previous run may still
                // have left a dangling upload worth repairing.
                if let Some(result) = resume.terminate_dangling().await? {
                    let _ = results_tx.send(result);
                }
                return Err(Error::ExpectedStartOfSource);
            }
            Err(e) => return Err(e),
        };

        match event {
            FrameEvent::Chunk(chunk) => match chunk.context {
                ChunkContext::Start { cursor, key } => {
                    if open.is_some() {
                        return Err(Error::UnhandledStreamCase(
                            "bucket opened while another is still in flight".to_string(),
                        ));
                    }
                    let outcome = resume.open_bucket(&key).await?;
                    if let Some(result) = outcome.terminated_previous {
                        let _ = results_tx.send(result);
                    }
                    let data = if outcome.object.resumed {
                        strip_open_bracket(chunk.data)?
                    } else {
                        chunk.data
                    };
                    let compressor = outcome.object.compressor;
                    let mut sink = ObjectSink::new(
                        store.clone(),
                        committer.clone(),
                        outcome.object.state,
                        config.part_size_bytes,
                    );
                    sink.write(compressor.transform(data)?, cursor).await?;
                    open = Some((sink, compressor));
                }
                ChunkContext::Tail { cursor } => {
                    let Some((sink, compressor)) = open.as_mut() else {
                        return Err(Error::UnhandledStreamCase(
                            "tail chunk arrived with no bucket in flight".to_string(),
                        ));
                    };
                    sink.write(compressor.transform(chunk.data)?, cursor).await?;
                }
            },
            FrameEvent::BucketComplete => {
                let Some((sink, _)) = open.take() else {
                    return Err(Error::UnhandledStreamCase(
                        "bucket completion with no bucket in flight".to_string(),
                    ));
                };
                let result = sink.complete().await?;
                let _ = results_tx.send(result);
            }
            FrameEvent::SourceDrained => {
                if let Some((sink, _)) = open.take() {
                    sink.flush_open().await?;
                }
                tracing::info!("upstream exhausted, backup run complete");
                return Ok(());
            }
        }
    }
}

/// Drops the leading `[` of a resumed bucket's first chunk; the array is
/// already open in storage.
fn strip_open_bracket(data: Bytes) -> Result<Bytes> {
    match data.first() {
        Some(b'[') => Ok(data.slice(1..)),
        _ => Err(Error::UnhandledStreamCase(
            "resumed bucket's first chunk does not open an array".to_string(),
        )),
    }
}
