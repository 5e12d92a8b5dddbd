use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{
    bucket::{BlobConnector, UploadOptions},
    client::GridFsClient,
};
use crate::{
    config::{ContainerPrefix, GridFsConfig},
    error::Result,
    path::object_key,
    provider::{ListedObject, PutOptions, StorageProvider},
    stream::{ObjectData, ObjectReader},
};

/// Containers are not stored anywhere: an object `path` in `container` is the
/// file named `container/path`.
pub struct GridFsProvider<C: BlobConnector> {
    client: GridFsClient<C>,
    container_prefix: ContainerPrefix,
}

impl<C: BlobConnector> GridFsProvider<C> {
    pub fn new(config: &GridFsConfig, connector: C) -> Self {
        Self {
            client: GridFsClient::new(config, connector),
            container_prefix: config.container_prefix,
        }
    }

    pub fn client(&self) -> &GridFsClient<C> {
        &self.client
    }

    fn container_pattern(&self, container: &str) -> Result<String> {
        let key = object_key(container, "")?;

        Ok(match self.container_prefix {
            ContainerPrefix::Legacy => format!("^{key}/*"),
            ContainerPrefix::Strict => format!("^{}/", regex::escape(&key)),
        })
    }
}

#[cfg(feature = "mongodb")]
impl GridFsProvider<super::mongo::MongoConnector> {
    pub fn mongodb(config: &GridFsConfig) -> Self {
        Self::new(config, super::mongo::MongoConnector::new(&config.database))
    }
}

#[async_trait]
impl<C: BlobConnector> StorageProvider for GridFsProvider<C> {
    type ContainerOptions = ();
    type PutMetadata = UploadOptions;

    fn provider_name(&self) -> &'static str {
        "gridfs"
    }

    async fn create_container(&self, _container: &str, _options: &()) -> Result<()> {
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_container(&self, container: &str) -> Result<()> {
        let pattern = self.container_pattern(container)?;
        let files = self.client.list_objects(&pattern).await?;

        if files.is_empty() {
            return Ok(());
        }

        debug!(count = files.len(), "deleting container contents");
        self.client.delete_files(&files).await
    }

    async fn ensure_container(&self, _container: &str, _options: &()) -> Result<()> {
        Ok(())
    }

    async fn is_container(&self, _container: &str) -> Result<bool> {
        Ok(true)
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_object(&self, container: &str, path: &str) -> Result<Option<ObjectReader>> {
        let filename = object_key(container, path)?;
        self.client.get_object(&filename).await
    }

    async fn put_object(
        &self,
        container: &str,
        path: &str,
        data: ObjectData,
        options: PutOptions<UploadOptions>,
    ) -> Result<()> {
        let filename = object_key(container, path)?;
        self.client
            .put_object(
                &filename,
                data.into_reader(),
                &options.metadata,
                options.replace,
            )
            .await
    }

    #[instrument(skip(self), err)]
    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ListedObject>> {
        let base = format!("{}/", object_key(container, "")?);
        let prefix = prefix.unwrap_or("").trim_start_matches('/');
        let pattern = format!("^{}{}", regex::escape(&base), regex::escape(prefix));

        let files = self.client.list_objects(&pattern).await?;

        Ok(files
            .into_iter()
            .map(|file| ListedObject {
                path: file
                    .filename
                    .strip_prefix(&base)
                    .unwrap_or(&file.filename)
                    .to_string(),
                size: file.length,
                last_modified: file.upload_date,
                creation_time: None,
                content_md5: file.md5,
            })
            .collect())
    }

    async fn delete_object(&self, container: &str, path: &str) -> Result<()> {
        let filename = object_key(container, path)?;
        self.client.delete_object(&filename).await
    }
}
