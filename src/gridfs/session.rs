use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use futures::future::BoxFuture;
use tokio::{
    io::{AsyncRead, ReadBuf},
    runtime::Handle,
    sync::Mutex,
};
use tracing::{debug, warn};

use super::bucket::{BlobBucket, BlobConnector};
use crate::{
    error::{Result, StorageError},
    stream::ObjectReader,
};

struct SessionState<B> {
    bucket: Option<Arc<B>>,
    leases: usize,
}

/// The single connection slot of a blob client.
///
/// The slot is opened lazily and shared by every [`Lease`] taken on it; the
/// last lease to be released closes it. The lock is held across connect, so a
/// half-open session is never observable and concurrent callers end up on the
/// same handle.
pub struct Session<C: BlobConnector> {
    connector: C,
    uri: String,
    state: Mutex<SessionState<C::Bucket>>,
}

impl<C: BlobConnector> Session<C> {
    pub fn new(connector: C, uri: String) -> Self {
        Self {
            connector,
            uri,
            state: Mutex::new(SessionState {
                bucket: None,
                leases: 0,
            }),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.bucket.is_some()
    }

    /// Opens the session unless one is already live.
    pub async fn connect(&self) -> Result<Arc<C::Bucket>> {
        let mut state = self.state.lock().await;
        self.open(&mut state).await
    }

    /// Closes the live session, if any.
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::close(&mut state).await
    }

    pub async fn lease(self: &Arc<Self>) -> Result<Lease<C>> {
        let mut state = self.state.lock().await;
        let bucket = self.open(&mut state).await?;
        state.leases += 1;

        Ok(Lease {
            session: Arc::clone(self),
            bucket,
            released: false,
        })
    }

    async fn release(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.leases = state.leases.saturating_sub(1);

        if state.leases > 0 {
            return Ok(());
        }
        Self::close(&mut state).await
    }

    async fn open(&self, state: &mut SessionState<C::Bucket>) -> Result<Arc<C::Bucket>> {
        if let Some(bucket) = &state.bucket {
            return Ok(Arc::clone(bucket));
        }

        debug!("opening session");
        let bucket = Arc::new(self.connector.connect(&self.uri).await?);
        state.bucket = Some(Arc::clone(&bucket));

        Ok(bucket)
    }

    async fn close(state: &mut SessionState<C::Bucket>) -> Result<()> {
        match state.bucket.take() {
            Some(bucket) => {
                debug!("closing session");
                bucket.close().await
            }
            None => Ok(()),
        }
    }
}

/// One operation's claim on the session.
///
/// Release it explicitly to observe teardown errors. A lease that is dropped
/// instead releases itself on the current runtime.
pub struct Lease<C: BlobConnector> {
    session: Arc<Session<C>>,
    bucket: Arc<C::Bucket>,
    released: bool,
}

impl<C: BlobConnector> Lease<C> {
    pub fn bucket(&self) -> &C::Bucket {
        &self.bucket
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.session.release().await
    }
}

impl<C: BlobConnector> Drop for Lease<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let session = Arc::clone(&self.session);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.release().await {
                        warn!(error = %e, "deferred session release failed");
                    }
                });
            }
            Err(_) => warn!("lease dropped outside a runtime, session left open"),
        }
    }
}

/// Download stream that owns the lease it was opened under.
///
/// The lease is released when the inner stream reports end of file, before
/// that end of file is passed on. A failed release is returned from that read
/// as an error wrapping [`StorageError::SessionTeardown`].
pub struct SessionReader<C: BlobConnector> {
    inner: ObjectReader,
    lease: Option<Lease<C>>,
    teardown: Option<BoxFuture<'static, Result<()>>>,
}

impl<C: BlobConnector> SessionReader<C> {
    pub fn new(inner: ObjectReader, lease: Lease<C>) -> Self {
        Self {
            inner,
            lease: Some(lease),
            teardown: None,
        }
    }
}

impl<C: BlobConnector> AsyncRead for SessionReader<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        loop {
            if let Some(teardown) = this.teardown.as_mut() {
                let result = ready!(teardown.as_mut().poll(cx));
                this.teardown = None;

                return Poll::Ready(result.map_err(|e| {
                    io::Error::other(StorageError::SessionTeardown(e.to_string()))
                }));
            }

            if this.lease.is_none() || buf.remaining() == 0 {
                return Pin::new(&mut this.inner).poll_read(cx, buf);
            }

            let filled = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            if buf.filled().len() > filled {
                return Poll::Ready(Ok(()));
            }

            if let Some(lease) = this.lease.take() {
                this.teardown = Some(Box::pin(lease.release()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::gridfs::{
        bucket::{FilenameFilter, UploadOptions},
        memory::MemoryConnector,
    };

    fn session(connector: &MemoryConnector) -> Arc<Session<MemoryConnector>> {
        Arc::new(Session::new(connector.clone(), "mongodb:///fs".to_string()))
    }

    #[tokio::test]
    async fn connect_and_disconnect_are_idempotent() {
        let connector = MemoryConnector::default();
        let session = session(&connector);

        session.disconnect().await.unwrap();
        assert_eq!(connector.stats().closes, 0);

        session.connect().await.unwrap();
        session.connect().await.unwrap();
        assert!(session.is_connected().await);
        assert_eq!(connector.stats().connects, 1);

        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert!(!session.is_connected().await);
        assert_eq!(connector.stats().closes, 1);
        assert_eq!(connector.last_uri().as_deref(), Some("mongodb:///fs"));
    }

    #[tokio::test]
    async fn last_lease_closes_the_session() {
        let connector = MemoryConnector::default();
        let session = session(&connector);

        let first = session.lease().await.unwrap();
        let second = session.lease().await.unwrap();
        assert_eq!(connector.stats().connects, 1);

        first.release().await.unwrap();
        assert!(session.is_connected().await);

        second.release().await.unwrap();
        assert!(!session.is_connected().await);
        assert_eq!(connector.stats().open_sessions, 0);
    }

    #[tokio::test]
    async fn connect_failure_leaves_session_idle() {
        let connector = MemoryConnector::default();
        connector.fail_connect(true);
        let session = session(&connector);

        assert!(session.lease().await.is_err());
        assert!(!session.is_connected().await);

        connector.fail_connect(false);
        session.lease().await.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_lease_releases_in_background() {
        let connector = MemoryConnector::default();
        let session = session(&connector);

        drop(session.lease().await.unwrap());
        for _ in 0..10 {
            if !session.is_connected().await {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(!session.is_connected().await);
    }

    async fn store(session: &Arc<Session<MemoryConnector>>, name: &str, body: &[u8]) {
        let lease = session.lease().await.unwrap();
        let mut writer = lease
            .bucket()
            .open_upload_stream(name, &UploadOptions::default())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut writer, body).await.unwrap();
        tokio::io::AsyncWriteExt::shutdown(&mut writer).await.unwrap();
        lease.release().await.unwrap();
    }

    async fn open_reader(
        session: &Arc<Session<MemoryConnector>>,
        name: &str,
    ) -> SessionReader<MemoryConnector> {
        let lease = session.lease().await.unwrap();
        let file = lease
            .bucket()
            .find(&FilenameFilter::Exact(name.to_string()), Some(1))
            .await
            .unwrap()
            .remove(0);
        let inner = lease.bucket().open_download_stream(&file.id).await.unwrap();
        SessionReader::new(inner, lease)
    }

    #[tokio::test]
    async fn reader_releases_at_end_of_stream() {
        let connector = MemoryConnector::default();
        let session = session(&connector);
        store(&session, "b1/f.txt", b"payload").await;

        let mut reader = open_reader(&session, "b1/f.txt").await;
        assert!(session.is_connected().await);

        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"payload");
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn teardown_failure_surfaces_on_the_stream() {
        let connector = MemoryConnector::default();
        let session = session(&connector);
        store(&session, "b1/f.txt", b"payload").await;

        let mut reader = open_reader(&session, "b1/f.txt").await;
        connector.fail_close(true);

        let mut body = Vec::new();
        let err = reader.read_to_end(&mut body).await.unwrap_err();
        assert_eq!(body, b"payload");

        let err = StorageError::from_io(err);
        assert!(matches!(err, StorageError::SessionTeardown(_)));
    }
}
