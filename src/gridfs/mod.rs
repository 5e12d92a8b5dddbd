//! Chunked-blob backend modelled on GridFS.
//!
//! Objects live as flat filenames `container/path` in a files collection.
//! Every client call takes a lease on the client's session; the session is
//! opened on the first lease and closed when the last one is released, which
//! for `get_object` happens only once the returned stream has been drained.

pub use bucket::{BlobBucket, BlobConnector, BlobFile, BlobId, FilenameFilter, UploadOptions};
pub use client::GridFsClient;
pub use memory::{MemoryBucket, MemoryConnector, MemoryStats};
#[cfg(feature = "mongodb")]
pub use mongo::{MongoBucket, MongoConnector};
pub use provider::GridFsProvider;
pub use session::{Lease, Session, SessionReader};
pub use uri::ConnectionUri;

mod bucket;
mod client;
pub mod memory;
#[cfg(feature = "mongodb")]
mod mongo;
mod provider;
mod session;
mod uri;
