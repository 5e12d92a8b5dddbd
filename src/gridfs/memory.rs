//! In-process blob collection.
//!
//! Files are kept as fixed-size chunks next to a files-collection record, the
//! way GridFS lays them out. Every connector clone shares the same data, and
//! the connector counts session opens/closes so callers can check that no
//! session is left behind. Connect and close failures can be injected.

use std::{
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::io::AsyncWrite;
use tokio_util::io::StreamReader;
use tracing::instrument;

use super::bucket::{BlobBucket, BlobConnector, BlobFile, BlobId, FilenameFilter, UploadOptions};
use crate::{
    error::{Result, StorageError},
    stream::{ObjectReader, ObjectWriter},
};

pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

struct StoredFile {
    record: BlobFile,
    chunks: Vec<Bytes>,
    metadata: Option<Map<String, Value>>,
}

#[derive(Default)]
struct Shared {
    files: Mutex<Vec<StoredFile>>,
    last_uri: Mutex<Option<String>>,
    next_id: AtomicU64,
    connects: AtomicUsize,
    closes: AtomicUsize,
    open_sessions: AtomicUsize,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
    fail_connect: AtomicBool,
    fail_close: AtomicBool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connects: usize,
    pub closes: usize,
    pub open_sessions: usize,
    pub uploads: usize,
    pub deletes: usize,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn stats(&self) -> MemoryStats {
        let shared = &self.shared;
        MemoryStats {
            connects: shared.connects.load(Ordering::SeqCst),
            closes: shared.closes.load(Ordering::SeqCst),
            open_sessions: shared.open_sessions.load(Ordering::SeqCst),
            uploads: shared.uploads.load(Ordering::SeqCst),
            deletes: shared.deletes.load(Ordering::SeqCst),
        }
    }

    pub fn last_uri(&self) -> Option<String> {
        self.shared.last_uri.lock().clone()
    }

    /// Records of every stored file, in upload order.
    pub fn files(&self) -> Vec<BlobFile> {
        self.shared
            .files
            .lock()
            .iter()
            .map(|f| f.record.clone())
            .collect()
    }

    pub fn metadata(&self, filename: &str) -> Option<Map<String, Value>> {
        self.shared
            .files
            .lock()
            .iter()
            .find(|f| f.record.filename == filename)
            .and_then(|f| f.metadata.clone())
    }

    pub fn fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobConnector for MemoryConnector {
    type Bucket = MemoryBucket;

    async fn connect(&self, uri: &str) -> Result<MemoryBucket> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("connection refused: {uri}")));
        }

        *self.shared.last_uri.lock() = Some(uri.to_string());
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.open_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryBucket {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct MemoryBucket {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl MemoryBucket {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("session is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobBucket for MemoryBucket {
    #[instrument(level = "trace", skip(self), err)]
    async fn find(&self, filter: &FilenameFilter, limit: Option<usize>) -> Result<Vec<BlobFile>> {
        self.ensure_open()?;

        let pattern = match filter {
            FilenameFilter::Pattern(p) => {
                Some(Regex::new(p).map_err(|e| StorageError::Backend(e.to_string()))?)
            }
            FilenameFilter::Exact(_) => None,
        };

        let files = self.shared.files.lock();
        let found = files
            .iter()
            .map(|f| &f.record)
            .filter(|record| match (filter, &pattern) {
                (FilenameFilter::Exact(name), _) => record.filename == *name,
                (_, Some(re)) => re.is_match(&record.filename),
                _ => false,
            })
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(found)
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn delete(&self, id: &BlobId) -> Result<()> {
        self.ensure_open()?;

        let mut files = self.shared.files.lock();
        let index = files
            .iter()
            .position(|f| f.record.id == *id)
            .ok_or_else(|| StorageError::NotFound(format!("file id {id}")))?;
        files.remove(index);
        self.shared.deletes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn open_download_stream(&self, id: &BlobId) -> Result<ObjectReader> {
        self.ensure_open()?;

        let chunks = self
            .shared
            .files
            .lock()
            .iter()
            .find(|f| f.record.id == *id)
            .map(|f| f.chunks.clone())
            .ok_or_else(|| StorageError::NotFound(format!("file id {id}")))?;

        let stream = futures::stream::iter(chunks.into_iter().map(Ok::<_, io::Error>));
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn open_upload_stream(
        &self,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<ObjectWriter> {
        self.ensure_open()?;

        Ok(Box::new(MemoryUploadStream {
            shared: Arc::clone(&self.shared),
            filename: filename.to_string(),
            chunk_size: options.chunk_size_bytes.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
            metadata: options.metadata.clone(),
            buffer: Vec::new(),
            committed: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("failed to close session".to_string()));
        }

        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
            self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MemoryUploadStream {
    shared: Arc<Shared>,
    filename: String,
    chunk_size: u32,
    metadata: Option<Map<String, Value>>,
    buffer: Vec<u8>,
    committed: bool,
}

impl MemoryUploadStream {
    fn commit(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);

        let record = BlobFile {
            id: BlobId(format!("{id:024x}")),
            filename: self.filename.clone(),
            length: buffer.len() as u64,
            chunk_size: self.chunk_size,
            upload_date: Utc::now(),
            md5: Some(format!("{:x}", md5::compute(&buffer))),
        };
        let chunks = buffer
            .chunks(self.chunk_size as usize)
            .map(Bytes::copy_from_slice)
            .collect();

        self.shared.files.lock().push(StoredFile {
            record,
            chunks,
            metadata: self.metadata.take(),
        });
        self.shared.uploads.fetch_add(1, Ordering::SeqCst);
        self.committed = true;
    }
}

impl AsyncWrite for MemoryUploadStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.committed {
            return Poll::Ready(Err(io::Error::other("upload already finished")));
        }

        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if !self.committed {
            self.commit();
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn upload(bucket: &MemoryBucket, name: &str, body: &[u8], options: &UploadOptions) {
        let mut writer = bucket.open_upload_stream(name, options).await.unwrap();
        writer.write_all(body).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stores_files_in_chunks_with_md5() {
        let connector = MemoryConnector::default();
        let bucket = connector.connect("mongodb:///fs").await.unwrap();

        let mut metadata = Map::new();
        metadata.insert("owner".to_string(), json!("tests"));
        let options = UploadOptions {
            chunk_size_bytes: Some(4),
            metadata: Some(metadata.clone()),
        };
        upload(&bucket, "b1/f.txt", b"hello world", &options).await;

        let files = connector.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].length, 11);
        assert_eq!(files[0].chunk_size, 4);
        assert_eq!(
            files[0].md5.as_deref(),
            Some("5eb63bbbe01eeed093cb22bb8f5acdc3")
        );
        assert_eq!(connector.metadata("b1/f.txt"), Some(metadata));

        let mut reader = bucket.open_download_stream(&files[0].id).await.unwrap();
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn abandoned_upload_stores_nothing() {
        let connector = MemoryConnector::default();
        let bucket = connector.connect("mongodb:///fs").await.unwrap();

        let mut writer = bucket
            .open_upload_stream("b1/partial", &UploadOptions::default())
            .await
            .unwrap();
        writer.write_all(b"half").await.unwrap();
        drop(writer);

        assert!(connector.files().is_empty());
    }

    #[tokio::test]
    async fn find_by_exact_name_and_pattern() {
        let connector = MemoryConnector::default();
        let bucket = connector.connect("mongodb:///fs").await.unwrap();
        for name in ["b1/a", "b1/b", "b2/a"] {
            upload(&bucket, name, b"x", &UploadOptions::default()).await;
        }

        let exact = bucket
            .find(&FilenameFilter::Exact("b1/a".to_string()), None)
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);

        let pattern = FilenameFilter::Pattern("^b1/".to_string());
        assert_eq!(bucket.find(&pattern, None).await.unwrap().len(), 2);
        assert_eq!(bucket.find(&pattern, Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_bucket_rejects_operations() {
        let connector = MemoryConnector::default();
        let bucket = connector.connect("mongodb:///fs").await.unwrap();
        bucket.close().await.unwrap();

        let err = bucket
            .find(&FilenameFilter::Exact("x".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
        assert_eq!(connector.stats().open_sessions, 0);
    }
}
