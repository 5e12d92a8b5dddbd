use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    error::Result,
    stream::{ObjectReader, ObjectWriter},
};

/// Identifier of one stored file record, opaque to everything but the driver
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The files-collection record of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobFile {
    pub id: BlobId,
    pub filename: String,
    pub length: u64,
    pub chunk_size: u32,
    pub upload_date: DateTime<Utc>,
    pub md5: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameFilter {
    Exact(String),
    /// Regular expression matched anywhere in the filename.
    Pattern(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    pub chunk_size_bytes: Option<u32>,
    pub metadata: Option<Map<String, Value>>,
}

/// Opens sessions against a blob database.
#[async_trait]
pub trait BlobConnector: Send + Sync + 'static {
    type Bucket: BlobBucket;

    async fn connect(&self, uri: &str) -> Result<Self::Bucket>;
}

/// A live session scoped to one bucket of chunked files.
#[async_trait]
pub trait BlobBucket: Send + Sync + 'static {
    async fn find(&self, filter: &FilenameFilter, limit: Option<usize>) -> Result<Vec<BlobFile>>;

    async fn delete(&self, id: &BlobId) -> Result<()>;

    async fn open_download_stream(&self, id: &BlobId) -> Result<ObjectReader>;

    /// The upload is committed when the returned writer is shut down; dropping
    /// it earlier abandons the upload.
    async fn open_upload_stream(
        &self,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<ObjectWriter>;

    async fn close(&self) -> Result<()>;
}
