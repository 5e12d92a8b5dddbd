use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::Result,
    stream::{ObjectData, ObjectReader},
};

/// One entry of a `list_objects` result, identical in shape for every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedObject {
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions<M> {
    /// Backend specific stream options.
    pub metadata: M,
    /// Best-effort delete of an existing object before writing.
    pub replace: bool,
}

impl<M: Default> PutOptions<M> {
    pub fn replace() -> Self {
        Self {
            metadata: M::default(),
            replace: true,
        }
    }
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    type ContainerOptions: Default + Send + Sync;
    type PutMetadata: Default + Send + Sync;

    fn provider_name(&self) -> &'static str;

    async fn create_container(
        &self,
        container: &str,
        options: &Self::ContainerOptions,
    ) -> Result<()>;

    async fn delete_container(&self, container: &str) -> Result<()>;

    /// Creates the container unless it already exists.
    async fn ensure_container(
        &self,
        container: &str,
        options: &Self::ContainerOptions,
    ) -> Result<()> {
        if !self.is_container(container).await? {
            self.create_container(container, options).await?;
        }
        Ok(())
    }

    async fn is_container(&self, container: &str) -> Result<bool>;

    async fn list_containers(&self) -> Result<Vec<String>>;

    /// Opens the object for reading. `None` means there is nothing stored at
    /// `path`; it is not an error.
    async fn get_object(&self, container: &str, path: &str) -> Result<Option<ObjectReader>>;

    async fn put_object(
        &self,
        container: &str,
        path: &str,
        data: ObjectData,
        options: PutOptions<Self::PutMetadata>,
    ) -> Result<()>;

    async fn list_objects(&self, container: &str, prefix: Option<&str>)
    -> Result<Vec<ListedObject>>;

    async fn delete_object(&self, container: &str, path: &str) -> Result<()>;

    /// Neither backend can sign URLs; callers always get an empty string.
    async fn presigned_get_url(
        &self,
        _container: &str,
        _path: &str,
        _ttl: Option<Duration>,
    ) -> Result<String> {
        Ok(String::new())
    }

    /// See [`StorageProvider::presigned_get_url`].
    async fn presigned_put_url(
        &self,
        _container: &str,
        _path: &str,
        _options: Option<&PutOptions<Self::PutMetadata>>,
        _ttl: Option<Duration>,
    ) -> Result<String> {
        Ok(String::new())
    }
}
