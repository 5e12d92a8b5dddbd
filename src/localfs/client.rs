use std::{
    fs::Metadata,
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::instrument;

use crate::{
    config::LocalFsConfig,
    error::{Result, StorageError},
    path::ResourcePath,
    stream::{ObjectReader, ObjectWriter},
};

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Create missing parents and succeed when the directory already exists.
    pub recursive: bool,
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Remove the directory together with everything inside it.
    pub force: bool,
}

/// Inclusive byte range, both ends optional.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub append: bool,
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub created: Option<DateTime<Utc>>,
}

impl ObjectStat {
    fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        Ok(Self {
            size: meta.len(),
            modified: meta.modified()?.into(),
            created: meta.created().ok().map(Into::into),
        })
    }
}

fn not_found_or(err: io::Error, path: &Path) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(path.display().to_string())
    } else {
        StorageError::Io(err)
    }
}

#[derive(Debug, Clone)]
pub struct FileObject {
    location: ResourcePath,
}

impl FileObject {
    pub fn name(&self) -> &str {
        self.location.name()
    }

    pub fn path(&self) -> PathBuf {
        self.location.path()
    }

    /// True only for an existing regular file. Never fails.
    pub async fn exists(&self) -> bool {
        matches!(fs::metadata(self.path()).await, Ok(meta) if meta.is_file())
    }

    pub async fn stat(&self) -> Result<ObjectStat> {
        let meta = fs::metadata(self.path()).await?;
        Ok(ObjectStat::from_metadata(&meta)?)
    }

    #[instrument(level = "debug", err)]
    pub async fn create_read_stream(&self, options: &ReadOptions) -> Result<ObjectReader> {
        let mut file = fs::File::open(self.path()).await?;

        let start = options.start.unwrap_or(0);
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }

        match options.end {
            Some(end) => {
                let limit = if end < start { 0 } else { end - start + 1 };
                Ok(Box::new(file.take(limit)))
            }
            None => Ok(Box::new(file)),
        }
    }

    #[instrument(level = "debug", err)]
    pub async fn create_write_stream(&self, options: &WriteOptions) -> Result<ObjectWriter> {
        let mut open = fs::OpenOptions::new();
        open.write(true).create(true);

        if options.append {
            open.append(true);
        } else {
            open.truncate(true);
        }

        #[cfg(unix)]
        if let Some(mode) = options.mode {
            open.mode(mode);
        }

        let file = open.open(self.path()).await?;
        Ok(Box::new(file))
    }

    #[instrument(level = "debug", err)]
    pub async fn delete(&self) -> Result<()> {
        let path = self.path();
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or(e, &path))
    }
}

#[derive(Debug, Clone)]
pub struct Container {
    location: ResourcePath,
}

impl Container {
    pub fn name(&self) -> &str {
        self.location.name()
    }

    pub fn path(&self) -> PathBuf {
        self.location.path()
    }

    #[instrument(level = "debug", err)]
    pub async fn create(&self, options: &CreateOptions) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(options.recursive);

        #[cfg(unix)]
        if let Some(mode) = options.mode {
            builder.mode(mode);
        }

        builder.create(self.path()).await?;
        Ok(())
    }

    #[instrument(level = "debug", err)]
    pub async fn delete(&self, options: &DeleteOptions) -> Result<()> {
        if options.force {
            fs::remove_dir_all(self.path()).await?;
        } else {
            fs::remove_dir(self.path()).await?;
        }
        Ok(())
    }

    /// True only for an existing directory. Never fails.
    pub async fn exists(&self) -> bool {
        matches!(fs::metadata(self.path()).await, Ok(meta) if meta.is_dir())
    }

    pub fn file(&self, name: &str) -> Result<FileObject> {
        Ok(FileObject {
            location: ResourcePath::new(&self.path().to_string_lossy(), name)?,
        })
    }

    /// Regular files directly inside the container, sub-directories excluded.
    pub async fn files(&self) -> Result<Vec<FileObject>> {
        let mut entries = fs::read_dir(self.path()).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(self.file(&entry.file_name().to_string_lossy())?);
            }
        }

        Ok(files)
    }
}

#[derive(Debug, Clone)]
pub struct LocalFsClient {
    root_dir: PathBuf,
}

impl LocalFsClient {
    pub fn new(config: &LocalFsConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn container(&self, name: &str) -> Result<Container> {
        Ok(Container {
            location: ResourcePath::new(&self.root_dir.to_string_lossy(), name)?,
        })
    }

    pub async fn containers(&self) -> Result<Vec<Container>> {
        let mut entries = fs::read_dir(&self.root_dir).await?;
        let mut containers = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                containers.push(self.container(&entry.file_name().to_string_lossy())?);
            }
        }

        Ok(containers)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn client(temp: &TempDir) -> LocalFsClient {
        LocalFsClient::new(&LocalFsConfig {
            root_dir: temp.path().to_path_buf(),
        })
    }

    async fn read_all(mut reader: ObjectReader) -> Vec<u8> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.unwrap();
        buffer
    }

    #[tokio::test]
    async fn container_lifecycle() {
        let temp = TempDir::new().unwrap();
        let container = client(&temp).container("bucket1").unwrap();

        assert!(!container.exists().await);
        container.create(&CreateOptions::default()).await.unwrap();
        assert!(container.exists().await);

        assert!(container.create(&CreateOptions::default()).await.is_err());
        let recursive = CreateOptions {
            recursive: true,
            ..Default::default()
        };
        container.create(&recursive).await.unwrap();

        container.delete(&DeleteOptions::default()).await.unwrap();
        assert!(!container.exists().await);
    }

    #[tokio::test]
    async fn non_empty_container_needs_force() {
        let temp = TempDir::new().unwrap();
        let container = client(&temp).container("bucket1").unwrap();
        container.create(&CreateOptions::default()).await.unwrap();
        std::fs::write(container.path().join("f.txt"), b"x").unwrap();

        let err = container.delete(&DeleteOptions::default()).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        container
            .delete(&DeleteOptions { force: true })
            .await
            .unwrap();
        assert!(!container.exists().await);
    }

    #[tokio::test]
    async fn files_skips_directories() {
        let temp = TempDir::new().unwrap();
        let container = client(&temp).container("bucket1").unwrap();
        container.create(&CreateOptions::default()).await.unwrap();
        std::fs::write(container.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(container.path().join("nested")).unwrap();

        let files = container.files().await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn file_exists_is_false_for_directories_and_missing_paths() {
        let temp = TempDir::new().unwrap();
        let container = client(&temp).container("bucket1").unwrap();
        container.create(&CreateOptions::default()).await.unwrap();
        std::fs::create_dir(container.path().join("dir")).unwrap();

        assert!(!container.file("dir").unwrap().exists().await);
        assert!(!container.file("missing").unwrap().exists().await);
    }

    #[tokio::test]
    async fn write_then_read_ranges() {
        let temp = TempDir::new().unwrap();
        let container = client(&temp).container("bucket1").unwrap();
        container.create(&CreateOptions::default()).await.unwrap();
        let file = container.file("f.txt").unwrap();

        let mut writer = file.create_write_stream(&WriteOptions::default()).await.unwrap();
        writer.write_all(b"hello world").await.unwrap();
        writer.shutdown().await.unwrap();

        let whole = file.create_read_stream(&ReadOptions::default()).await.unwrap();
        assert_eq!(read_all(whole).await, b"hello world");

        let range = ReadOptions {
            start: Some(6),
            end: Some(8),
        };
        let part = file.create_read_stream(&range).await.unwrap();
        assert_eq!(read_all(part).await, b"wor");

        let stat = file.stat().await.unwrap();
        assert_eq!(stat.size, 11);
    }

    #[tokio::test]
    async fn append_keeps_existing_bytes() {
        let temp = TempDir::new().unwrap();
        let container = client(&temp).container("bucket1").unwrap();
        container.create(&CreateOptions::default()).await.unwrap();
        let file = container.file("log.txt").unwrap();

        for chunk in [&b"one,"[..], &b"two"[..]] {
            let options = WriteOptions {
                append: true,
                ..Default::default()
            };
            let mut writer = file.create_write_stream(&options).await.unwrap();
            writer.write_all(chunk).await.unwrap();
            writer.shutdown().await.unwrap();
        }

        let reader = file.create_read_stream(&ReadOptions::default()).await.unwrap();
        assert_eq!(read_all(reader).await, b"one,two");
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let container = client(&temp).container("bucket1").unwrap();
        container.create(&CreateOptions::default()).await.unwrap();

        let err = container.file("nope").unwrap().delete().await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn containers_lists_directories_only() {
        let temp = TempDir::new().unwrap();
        let client = client(&temp);
        std::fs::create_dir(temp.path().join("b1")).unwrap();
        std::fs::create_dir(temp.path().join("b2")).unwrap();
        std::fs::write(temp.path().join("stray.txt"), b"x").unwrap();

        let mut names: Vec<_> = client
            .containers()
            .await
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["b1", "b2"]);
    }
}
