use std::{fmt, io::Cursor};

use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StorageError;

pub type ObjectReader = Box<dyn AsyncRead + Unpin + Send>;

pub type ObjectWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Payload accepted by `put_object`.
///
/// Every variant is turned into one [`ObjectReader`] by [`ObjectData::into_reader`]
/// before it reaches a backend, so drivers only ever deal with streams.
pub enum ObjectData {
    Stream(ObjectReader),
    Bytes(Bytes),
    Text(String),
}

impl ObjectData {
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        ObjectData::Stream(Box::new(reader))
    }

    pub fn into_reader(self) -> ObjectReader {
        match self {
            ObjectData::Stream(reader) => reader,
            ObjectData::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            ObjectData::Text(text) => Box::new(Cursor::new(text.into_bytes())),
        }
    }
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectData::Stream(_) => f.write_str("Stream(..)"),
            ObjectData::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ObjectData::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
        }
    }
}

impl From<Bytes> for ObjectData {
    fn from(value: Bytes) -> Self {
        ObjectData::Bytes(value)
    }
}

impl From<Vec<u8>> for ObjectData {
    fn from(value: Vec<u8>) -> Self {
        ObjectData::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for ObjectData {
    fn from(value: &'static [u8]) -> Self {
        ObjectData::Bytes(Bytes::from_static(value))
    }
}

impl From<String> for ObjectData {
    fn from(value: String) -> Self {
        ObjectData::Text(value)
    }
}

impl From<&str> for ObjectData {
    fn from(value: &str) -> Self {
        ObjectData::Text(value.to_string())
    }
}

/// Loosely typed payloads, as found in JSON documents: strings become text,
/// arrays of byte values become buffers and anything else is rejected.
impl TryFrom<Value> for ObjectData {
    type Error = StorageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(ObjectData::Text(text)),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or(StorageError::InvalidData)
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(ObjectData::from),
            _ => Err(StorageError::InvalidData),
        }
    }
}
