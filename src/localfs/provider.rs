use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::client::{CreateOptions, DeleteOptions, LocalFsClient, ReadOptions, WriteOptions};
use crate::{
    config::LocalFsConfig,
    error::Result,
    provider::{ListedObject, PutOptions, StorageProvider},
    stream::{ObjectData, ObjectReader},
};

#[derive(Debug, Clone)]
pub struct LocalFsProvider {
    client: LocalFsClient,
}

impl LocalFsProvider {
    pub fn new(config: &LocalFsConfig) -> Self {
        Self {
            client: LocalFsClient::new(config),
        }
    }

    pub fn client(&self) -> &LocalFsClient {
        &self.client
    }
}

#[async_trait]
impl StorageProvider for LocalFsProvider {
    type ContainerOptions = CreateOptions;
    type PutMetadata = WriteOptions;

    fn provider_name(&self) -> &'static str {
        "local-fs"
    }

    #[instrument(skip(self), err)]
    async fn create_container(&self, container: &str, options: &CreateOptions) -> Result<()> {
        self.client.container(container)?.create(options).await
    }

    #[instrument(skip(self), err)]
    async fn delete_container(&self, container: &str) -> Result<()> {
        self.client
            .container(container)?
            .delete(&DeleteOptions::default())
            .await
    }

    #[instrument(skip(self), ret, err)]
    async fn is_container(&self, container: &str) -> Result<bool> {
        Ok(self.client.container(container)?.exists().await)
    }

    #[instrument(skip(self), err)]
    async fn list_containers(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .client
            .containers()
            .await?
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        names.sort();

        Ok(names)
    }

    #[instrument(skip(self), err)]
    async fn get_object(&self, container: &str, path: &str) -> Result<Option<ObjectReader>> {
        let file = self.client.container(container)?.file(path)?;

        if !file.exists().await {
            return Ok(None);
        }

        let reader = file.create_read_stream(&ReadOptions::default()).await?;
        Ok(Some(reader))
    }

    #[instrument(skip(self, data, options), fields(replace = options.replace), err)]
    async fn put_object(
        &self,
        container: &str,
        path: &str,
        data: ObjectData,
        options: PutOptions<WriteOptions>,
    ) -> Result<()> {
        let file = self.client.container(container)?.file(path)?;

        if options.replace {
            if let Err(e) = file.delete().await {
                debug!(error = %e, "nothing to replace");
            }
        }

        let mut reader = data.into_reader();
        let mut writer = file.create_write_stream(&options.metadata).await?;

        let written = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.shutdown().await?;
        debug!(written, "object stored");

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ListedObject>> {
        let files = self.client.container(container)?.files().await?;
        let mut results = Vec::with_capacity(files.len());

        for file in files {
            if prefix.is_some_and(|p| !file.name().starts_with(p)) {
                continue;
            }

            let stat = file.stat().await?;
            results.push(ListedObject {
                path: file.name().to_string(),
                size: stat.size,
                last_modified: stat.modified,
                creation_time: stat.created,
                content_md5: None,
            });
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }

    #[instrument(skip(self), err)]
    async fn delete_object(&self, container: &str, path: &str) -> Result<()> {
        self.client.container(container)?.file(path)?.delete().await
    }
}
