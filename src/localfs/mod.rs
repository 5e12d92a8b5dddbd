//! Local filesystem backend: containers are directories under a root,
//! objects are the regular files inside them.

pub use client::{
    Container, CreateOptions, DeleteOptions, FileObject, LocalFsClient, ObjectStat, ReadOptions,
    WriteOptions,
};
pub use provider::LocalFsProvider;

mod client;
mod provider;
