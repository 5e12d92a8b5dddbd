pub mod config;
pub mod error;
pub mod gridfs;
pub mod localfs;
pub mod path;
pub mod provider;
pub mod stream;

pub use error::{FailureKind, Result, StorageError};
pub use provider::{ListedObject, PutOptions, StorageProvider};
pub use stream::{ObjectData, ObjectReader, ObjectWriter};
