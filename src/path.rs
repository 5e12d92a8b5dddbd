use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};

/// Strips a single trailing `/` unless the whole string is `/`.
pub fn trim_parent(parent: &str) -> &str {
    if parent.len() > 1 {
        parent.strip_suffix('/').unwrap_or(parent)
    } else {
        parent
    }
}

/// Splits a `/`-separated path into its meaningful segments.
///
/// Empty and `.` segments are dropped; `..` is rejected so that no resolved
/// path can climb out of the root or container it was joined onto.
fn segments(path: &str) -> Result<Vec<&str>> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| {
            if s == ".." {
                Err(StorageError::InvalidPath(path.to_string()))
            } else {
                Ok(s)
            }
        })
        .collect()
}

/// Builds the flat filename under which a blob backend stores `path` inside
/// `container`.
pub fn object_key(container: &str, path: &str) -> Result<String> {
    let mut parts = segments(container)?;
    parts.extend(segments(path)?);

    if parts.is_empty() {
        return Err(StorageError::InvalidPath(format!("{container}/{path}")));
    }

    let key = parts.join("/");
    if container.starts_with('/') {
        Ok(format!("/{key}"))
    } else {
        Ok(key)
    }
}

/// A `(parent, name)` pair naming a container or an object on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    parent: String,
    name: String,
}

impl ResourcePath {
    pub fn new(parent: &str, name: &str) -> Result<Self> {
        Ok(Self {
            parent: trim_parent(parent).to_string(),
            name: segments(name)?.join("/"),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn path(&self) -> PathBuf {
        Path::new(&self.parent).join(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_single_trailing_slash() {
        assert_eq!(trim_parent("/data/"), "/data");
        assert_eq!(trim_parent("/data//"), "/data/");
        assert_eq!(trim_parent("/"), "/");
        assert_eq!(trim_parent(""), "");
    }

    #[test]
    fn object_key_joins_and_normalizes() {
        assert_eq!(object_key("b1", "f.txt").unwrap(), "b1/f.txt");
        assert_eq!(object_key("b1/", "/nested/./f.txt").unwrap(), "b1/nested/f.txt");
        assert_eq!(object_key("/samples", "test.txt").unwrap(), "/samples/test.txt");
    }

    #[test]
    fn object_key_rejects_traversal() {
        let err = object_key("b1", "../b2/secret").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
        assert!(object_key("", "").is_err());
    }

    #[test]
    fn resource_path_joins_parent_and_name() {
        let resource = ResourcePath::new("/data/", "bucket1").unwrap();
        assert_eq!(resource.parent(), "/data");
        assert_eq!(resource.name(), "bucket1");
        assert_eq!(resource.path(), PathBuf::from("/data/bucket1"));

        let current = ResourcePath::new("/tmp", ".").unwrap();
        assert_eq!(current.path(), PathBuf::from("/tmp"));

        assert!(ResourcePath::new("/data", "a/../../etc").is_err());
    }
}
