use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use super::{
    bucket::{BlobBucket, BlobConnector, BlobFile, FilenameFilter, UploadOptions},
    session::{Lease, Session, SessionReader},
    uri::ConnectionUri,
};
use crate::{
    config::GridFsConfig,
    error::{Result, StorageError},
    stream::ObjectReader,
};

/// Releases `lease` and returns `result`. An operation failure takes
/// precedence over a failure to release.
async fn finish<C: BlobConnector, T>(lease: Lease<C>, result: Result<T>) -> Result<T> {
    let released = lease.release().await;

    match (result, released) {
        (Err(e), Err(release_err)) => {
            warn!(error = %release_err, "session release failed after an error");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(value), Ok(())) => Ok(value),
    }
}

/// Object operations against a blob database, one session lease per call.
pub struct GridFsClient<C: BlobConnector> {
    session: Arc<Session<C>>,
}

impl<C: BlobConnector> GridFsClient<C> {
    pub fn new(config: &GridFsConfig, connector: C) -> Self {
        let uri = ConnectionUri::parse(config).to_string();

        Self {
            session: Arc::new(Session::new(connector, uri)),
        }
    }

    pub fn session(&self) -> &Arc<Session<C>> {
        &self.session
    }

    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await.map(|_| ())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    pub async fn lease(&self) -> Result<Lease<C>> {
        self.session.lease().await
    }

    /// Opens `filename` for reading, or returns `None` when no such file is
    /// stored. The session stays open until the returned stream is drained.
    #[instrument(skip(self), err)]
    pub async fn get_object(&self, filename: &str) -> Result<Option<ObjectReader>> {
        let lease = self.session.lease().await?;

        let found = lease
            .bucket()
            .find(&FilenameFilter::Exact(filename.to_string()), Some(1))
            .await;
        let file = match found {
            Ok(files) => files.into_iter().next(),
            Err(e) => return finish(lease, Err(e)).await,
        };

        let Some(file) = file else {
            debug!("no such object");
            return finish(lease, Ok(None)).await;
        };

        match lease.bucket().open_download_stream(&file.id).await {
            Ok(inner) => Ok(Some(Box::new(SessionReader::new(inner, lease)))),
            Err(e) => finish(lease, Err(e)).await,
        }
    }

    #[instrument(skip(self), err)]
    pub async fn delete_object(&self, filename: &str) -> Result<()> {
        let lease = self.session.lease().await?;
        let result = self.delete_in(&lease, filename).await;
        finish(lease, result).await
    }

    /// Deletes the first file named `filename` on an already held lease.
    pub async fn delete_in(&self, lease: &Lease<C>, filename: &str) -> Result<()> {
        let files = lease
            .bucket()
            .find(&FilenameFilter::Exact(filename.to_string()), Some(1))
            .await?;

        match files.first() {
            Some(file) => lease.bucket().delete(&file.id).await,
            None => Err(StorageError::NotFound(filename.to_string())),
        }
    }

    /// Deletes every listed file on one lease. Every delete runs to
    /// completion; the first failure is returned.
    #[instrument(skip(self, files), fields(count = files.len()), err)]
    pub async fn delete_files(&self, files: &[BlobFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let lease = self.session.lease().await?;
        let result = futures::future::join_all(files.iter().map(|f| lease.bucket().delete(&f.id)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .map(|_| ());
        finish(lease, result).await
    }

    #[instrument(skip(self), err)]
    pub async fn list_objects(&self, pattern: &str) -> Result<Vec<BlobFile>> {
        let lease = self.session.lease().await?;
        let result = lease
            .bucket()
            .find(&FilenameFilter::Pattern(pattern.to_string()), None)
            .await;
        finish(lease, result).await
    }

    #[instrument(skip(self, reader), err)]
    pub async fn put_object(
        &self,
        filename: &str,
        mut reader: ObjectReader,
        options: &UploadOptions,
        replace: bool,
    ) -> Result<()> {
        let lease = self.session.lease().await?;

        if replace {
            if let Err(e) = self.delete_in(&lease, filename).await {
                debug!(error = %e, "nothing replaced");
            }
        }

        let result = async {
            let mut writer = lease.bucket().open_upload_stream(filename, options).await?;
            let written = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.shutdown().await?;
            debug!(written, "upload finished");
            Ok::<_, StorageError>(())
        }
        .await;

        finish(lease, result).await
    }
}
