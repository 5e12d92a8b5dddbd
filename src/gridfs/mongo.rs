//! GridFS through the official MongoDB driver.

use async_trait::async_trait;
use chrono::DateTime;
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client,
    bson::{Bson, doc, oid::ObjectId},
    gridfs::{FilesCollectionDocument, GridFsBucket},
};
use tokio_util::compat::{FuturesAsyncReadCompatExt, FuturesAsyncWriteCompatExt};
use tracing::instrument;

use super::bucket::{BlobBucket, BlobConnector, BlobFile, BlobId, FilenameFilter, UploadOptions};
use crate::{
    error::{Result, StorageError},
    stream::{ObjectReader, ObjectWriter},
};

#[derive(Debug, Clone)]
pub struct MongoConnector {
    database: String,
}

impl MongoConnector {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl BlobConnector for MongoConnector {
    type Bucket = MongoBucket;

    #[instrument(skip(self, uri), fields(database = %self.database), err)]
    async fn connect(&self, uri: &str) -> Result<MongoBucket> {
        let client = Client::with_uri_str(uri).await?;
        let bucket = client.database(&self.database).gridfs_bucket(None);

        Ok(MongoBucket { client, bucket })
    }
}

pub struct MongoBucket {
    client: Client,
    bucket: GridFsBucket,
}

fn to_bson(id: &BlobId) -> Bson {
    ObjectId::parse_str(&id.0)
        .map(Bson::ObjectId)
        .unwrap_or_else(|_| Bson::String(id.0.clone()))
}

fn from_bson(id: &Bson) -> BlobId {
    match id {
        Bson::ObjectId(oid) => BlobId(oid.to_hex()),
        Bson::String(s) => BlobId(s.clone()),
        other => BlobId(other.to_string()),
    }
}

fn to_blob_file(file: FilesCollectionDocument) -> BlobFile {
    let md5 = file
        .metadata
        .as_ref()
        .and_then(|m| m.get_str("md5").ok())
        .map(str::to_string);

    BlobFile {
        id: from_bson(&file.id),
        filename: file.filename.unwrap_or_default(),
        length: file.length,
        chunk_size: file.chunk_size_bytes,
        upload_date: DateTime::from_timestamp_millis(file.upload_date.timestamp_millis())
            .unwrap_or_default(),
        md5,
    }
}

#[async_trait]
impl BlobBucket for MongoBucket {
    #[instrument(level = "debug", skip(self), err)]
    async fn find(&self, filter: &FilenameFilter, limit: Option<usize>) -> Result<Vec<BlobFile>> {
        let filter = match filter {
            FilenameFilter::Exact(name) => doc! { "filename": name.as_str() },
            FilenameFilter::Pattern(pattern) => doc! { "filename": { "$regex": pattern.as_str() } },
        };

        let files: Vec<FilesCollectionDocument> = self
            .bucket
            .find(filter)
            .await?
            .take(limit.unwrap_or(usize::MAX))
            .try_collect()
            .await?;

        Ok(files.into_iter().map(to_blob_file).collect())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn delete(&self, id: &BlobId) -> Result<()> {
        self.bucket.delete(to_bson(id)).await?;
        Ok(())
    }

    async fn open_download_stream(&self, id: &BlobId) -> Result<ObjectReader> {
        let stream = self.bucket.open_download_stream(to_bson(id)).await?;
        Ok(Box::new(stream.compat()))
    }

    async fn open_upload_stream(
        &self,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<ObjectWriter> {
        let mut upload = self.bucket.open_upload_stream(filename);

        if let Some(size) = options.chunk_size_bytes {
            upload = upload.chunk_size_bytes(size);
        }
        if let Some(metadata) = &options.metadata {
            let metadata = mongodb::bson::to_document(metadata)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            upload = upload.metadata(metadata);
        }

        let stream = upload.await?;
        Ok(Box::new(stream.compat_write()))
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
