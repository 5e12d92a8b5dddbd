use std::fmt;

use serde_json::Value;

use crate::config::{Credentials, GridFsConfig};

/// Connection string for the blob database, built once from a [`GridFsConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    pub auth: Option<Credentials>,
    pub servers: Vec<String>,
    pub database: String,
    pub options: Vec<(String, String)>,
}

fn option_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl ConnectionUri {
    pub fn parse(config: &GridFsConfig) -> Self {
        let mut servers: Vec<String> = Vec::with_capacity(config.servers.len());
        for server in &config.servers {
            if !servers.contains(server) {
                servers.push(server.clone());
            }
        }

        let options = config
            .options
            .flags
            .iter()
            .filter_map(|(key, value)| option_value(value).map(|v| (key.clone(), v)))
            .collect();

        Self {
            auth: config.options.auth.clone(),
            servers,
            database: config.database.clone(),
            options,
        }
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mongodb://")?;

        if let Some(auth) = &self.auth {
            write!(f, "{}:{}@", auth.user, auth.password)?;
        }

        write!(f, "{}/{}", self.servers.join(","), self.database)?;

        if !self.options.is_empty() {
            let query = self
                .options
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("&");
            write!(f, "?{query}")?;
        }

        Ok(())
    }
}
