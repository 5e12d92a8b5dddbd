use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid data argument: must be a stream, a Buffer or a string")]
    InvalidData,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Session teardown failed: {0}")]
    SessionTeardown(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Coarse classification shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    InvalidInput,
    BackendFailure,
    SessionTeardownFailure,
}

impl StorageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StorageError::NotFound(_) => FailureKind::NotFound,
            StorageError::InvalidData | StorageError::InvalidPath(_) => FailureKind::InvalidInput,
            StorageError::SessionTeardown(_) => FailureKind::SessionTeardownFailure,
            StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound => FailureKind::NotFound,
            _ => FailureKind::BackendFailure,
        }
    }

    /// Recovers a `StorageError` that travelled through an `io::Error`,
    /// as happens for failures surfaced by an object stream.
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<StorageError>()) {
            return StorageError::Io(err);
        }

        match err.into_inner().map(|inner| inner.downcast::<StorageError>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(inner)) => StorageError::Io(io::Error::other(inner)),
            None => StorageError::Backend("io error without payload".to_string()),
        }
    }
}
