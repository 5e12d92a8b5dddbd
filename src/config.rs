use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFsConfig {
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// How `delete_container` selects the objects belonging to a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerPrefix {
    /// `^<container>/*`, unescaped. Also matches every filename that merely
    /// starts with the container name, e.g. `b10/x` for container `b1`.
    #[default]
    Legacy,
    /// `^<escaped container>/`.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridFsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Credentials>,
    /// Driver flags appended to the connection URI, in insertion order.
    #[serde(flatten)]
    pub flags: Map<String, Value>,
}

fn default_database() -> String {
    "fs".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridFsConfig {
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub options: GridFsOptions,
    #[serde(default)]
    pub container_prefix: ContainerPrefix,
}

impl Default for GridFsConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            database: default_database(),
            options: GridFsOptions::default(),
            container_prefix: ContainerPrefix::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum BackendConfig {
    #[serde(rename = "local-fs")]
    LocalFs(LocalFsConfig),
    #[serde(rename = "gridfs")]
    GridFs(GridFsConfig),
}

impl BackendConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| StorageError::Configuration(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }
}
