//! The storage sink: parts, acknowledgements, and cursor commits.
//!
//! Buffers a bucket's chunks into storage-appropriate parts and uploads them
//! strictly in order. A cursor is committed once every byte of its chunk
//! lies inside an acknowledged part; on a part failure neither that part's
//! cursors nor any later ones are committed, so the last committed cursor
//! always marks a durable frontier.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use common::{UploadState, UploadStore};

use crate::error::Result;
use crate::model::BackupResult;
use crate::source::CursorCommitter;

pub(crate) struct ObjectSink<C> {
    store: Arc<dyn UploadStore>,
    committer: Arc<dyn CursorCommitter<C>>,
    state: UploadState,
    part_size: usize,
    buf: BytesMut,
    /// Cursors paired with the end offset of their bytes, relative to the
    /// start of the unuploaded buffer.
    staged: VecDeque<(C, usize)>,
}

impl<C: Send + 'static> ObjectSink<C> {
    pub(crate) fn new(
        store: Arc<dyn UploadStore>,
        committer: Arc<dyn CursorCommitter<C>>,
        state: UploadState,
        part_size: usize,
    ) -> Self {
        Self {
            store,
            committer,
            state,
            part_size,
            buf: BytesMut::new(),
            staged: VecDeque::new(),
        }
    }

    /// Accepts one chunk and uploads as many full parts as are available.
    pub(crate) async fn write(&mut self, data: Bytes, cursor: C) -> Result<()> {
        self.buf.extend_from_slice(&data);
        self.staged.push_back((cursor, self.buf.len()));
        while self.buf.len() >= self.part_size {
            self.flush_part(self.part_size).await?;
        }
        Ok(())
    }

    /// Uploads the first `len` buffered bytes as one part, then commits
    /// every cursor whose bytes are now fully acknowledged.
    async fn flush_part(&mut self, len: usize) -> Result<()> {
        let part = self.buf.split_to(len).freeze();
        self.store.upload_part(&self.state, part).await?;
        tracing::debug!(key = %self.state.key, part_len = len, "part acknowledged");

        while self.staged.front().is_some_and(|(_, end)| *end <= len) {
            if let Some((cursor, _)) = self.staged.pop_front() {
                self.committer.commit(cursor).await?;
            }
        }
        for (_, end) in self.staged.iter_mut() {
            *end -= len;
        }
        Ok(())
    }

    /// Flushes the remainder and finalises the upload into an object.
    pub(crate) async fn complete(mut self) -> Result<BackupResult> {
        if !self.buf.is_empty() {
            let len = self.buf.len();
            self.flush_part(len).await?;
        }
        let completed = self.store.complete_upload(&self.state).await?;
        tracing::info!(key = %completed.key, size = completed.size, "backup object completed");
        Ok(BackupResult::from(completed))
    }

    /// Flushes the remainder but leaves the upload in progress, so a later
    /// run can resume or terminate it.
    pub(crate) async fn flush_open(mut self) -> Result<()> {
        if !self.buf.is_empty() {
            let len = self.buf.len();
            self.flush_part(len).await?;
        }
        tracing::info!(key = %self.state.key, "leaving upload in progress");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use common::{
        CompletedObject, InMemoryUploadStore, InProgressUpload, ObjectMetadata, StorageError,
        StorageResult,
    };

    use crate::testing::RecordingCommitter;

    async fn sink_over(
        store: Arc<InMemoryUploadStore>,
        committer: Arc<RecordingCommitter>,
        part_size: usize,
    ) -> ObjectSink<u64> {
        let state = store
            .begin_upload("k.json", ObjectMetadata::default())
            .await
            .unwrap();
        ObjectSink::new(store, committer, state, part_size)
    }

    #[tokio::test]
    async fn should_buffer_chunks_into_fixed_size_parts() {
        // given
        let store = Arc::new(InMemoryUploadStore::new());
        let committer = Arc::new(RecordingCommitter::default());
        let mut sink = sink_over(store.clone(), committer.clone(), 4).await;

        // when: three 3-byte chunks against a 4-byte part size
        sink.write(Bytes::from_static(b"aaa"), 0).await.unwrap();
        sink.write(Bytes::from_static(b"bbb"), 1).await.unwrap();
        sink.write(Bytes::from_static(b"ccc"), 2).await.unwrap();

        // then: two full parts uploaded, one byte still buffered
        assert_eq!(store.staged_part_sizes("k.json"), Some(vec![4, 4]));
    }

    #[tokio::test]
    async fn should_commit_cursor_only_once_its_bytes_are_acknowledged() {
        // given
        let store = Arc::new(InMemoryUploadStore::new());
        let committer = Arc::new(RecordingCommitter::default());
        let mut sink = sink_over(store.clone(), committer.clone(), 4).await;

        // when: the first part holds all of chunk 0 and half of chunk 1
        sink.write(Bytes::from_static(b"aaa"), 0).await.unwrap();
        sink.write(Bytes::from_static(b"bbb"), 1).await.unwrap();

        // then: only cursor 0 is committed so far
        assert_eq!(committer.committed(), vec![0]);

        // when: completion flushes the rest
        sink.complete().await.unwrap();

        // then
        assert_eq!(committer.committed(), vec![0, 1]);
    }

    #[tokio::test]
    async fn should_commit_all_cursors_in_order_on_completion() {
        // given
        let store = Arc::new(InMemoryUploadStore::new());
        let committer = Arc::new(RecordingCommitter::default());
        let mut sink = sink_over(store.clone(), committer.clone(), 1024).await;

        // when
        for cursor in 0..5u64 {
            sink.write(Bytes::from_static(b"x,"), cursor).await.unwrap();
        }
        let result = sink.complete().await.unwrap();

        // then
        assert_eq!(committer.committed(), vec![0, 1, 2, 3, 4]);
        assert_eq!(result.object_size, 10);
        assert!(store.get_object("k.json").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_flush_remainder_but_keep_upload_open() {
        // given
        let store = Arc::new(InMemoryUploadStore::new());
        let committer = Arc::new(RecordingCommitter::default());
        let mut sink = sink_over(store.clone(), committer.clone(), 1024).await;

        // when
        sink.write(Bytes::from_static(b"[x,"), 0).await.unwrap();
        sink.flush_open().await.unwrap();

        // then: bytes staged and committed, object not finalised
        assert_eq!(store.staged_bytes("k.json"), Some(Bytes::from_static(b"[x,")));
        assert_eq!(committer.committed(), vec![0]);
        assert!(store.get_object("k.json").await.unwrap().is_none());
    }

    /// Store wrapper that fails every `upload_part` call.
    struct FailingPartStore(InMemoryUploadStore);

    #[async_trait]
    impl UploadStore for FailingPartStore {
        async fn list_in_progress(&self) -> StorageResult<Vec<InProgressUpload>> {
            self.0.list_in_progress().await
        }
        async fn begin_upload(
            &self,
            key: &str,
            metadata: ObjectMetadata,
        ) -> StorageResult<UploadState> {
            self.0.begin_upload(key, metadata).await
        }
        async fn upload_part(&self, _state: &UploadState, _data: Bytes) -> StorageResult<()> {
            Err(StorageError::Storage("part refused".to_string()))
        }
        async fn complete_upload(&self, state: &UploadState) -> StorageResult<CompletedObject> {
            self.0.complete_upload(state).await
        }
        async fn get_object(&self, key: &str) -> StorageResult<Option<Bytes>> {
            self.0.get_object(key).await
        }
        async fn list_objects(&self) -> StorageResult<Vec<String>> {
            self.0.list_objects().await
        }
    }

    #[tokio::test]
    async fn should_not_commit_any_cursor_of_a_failed_part() {
        // given
        let store = Arc::new(FailingPartStore(InMemoryUploadStore::new()));
        let committer = Arc::new(RecordingCommitter::default());
        let state = store
            .begin_upload("k.json", ObjectMetadata::default())
            .await
            .unwrap();
        let mut sink: ObjectSink<u64> =
            ObjectSink::new(store, committer.clone(), state, 2);

        // when: the chunk fills a part and the upload fails
        let result = sink.write(Bytes::from_static(b"abcd"), 0).await;

        // then
        assert!(result.is_err());
        assert!(committer.committed().is_empty());
    }
}
