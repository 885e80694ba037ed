//! Config file discovery and parsing.
//!
//! The format is inferred from the file extension. A file that does not
//! exist yields `Ok(None)`; anything else that goes wrong while reading or
//! parsing is a [`ConfigError`].

use crate::error::ConfigError;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Recognized config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Extensions searched during discovery, in order.
    pub const EXTENSIONS: &'static [&'static str] = &["yaml", "yml", "json", "toml"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    /// Infer the format from a path. Files without a recognized extension are
    /// read as YAML, which also accepts JSON.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .unwrap_or(ConfigFormat::Yaml)
    }

    /// Parse file content into a JSON document.
    pub fn parse(&self, content: &str) -> Result<Value, String> {
        let value = match self {
            ConfigFormat::Yaml => {
                serde_yaml::from_str::<Value>(content).map_err(|e| e.to_string())?
            }
            ConfigFormat::Json => {
                serde_json::from_str::<Value>(content).map_err(|e| e.to_string())?
            }
            ConfigFormat::Toml => {
                let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
                serde_json::to_value(table).map_err(|e| e.to_string())?
            }
        };
        match value {
            // An empty YAML file parses to null.
            Value::Null => Ok(Value::Object(Default::default())),
            Value::Object(_) => Ok(value),
            other => Err(format!("expected a mapping at the top level, found {other}")),
        }
    }
}

/// Search `dir` for the default config file.
///
/// `file_name` is tried verbatim first, then its stem with every recognized
/// extension (`config.yaml` also finds `config.toml`).
pub fn discover(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let exact = dir.join(file_name);
    if exact.is_file() {
        return Some(exact);
    }
    let stem = file_name.split('.').next().unwrap_or(file_name);
    ConfigFormat::EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}

/// Read and parse a config file. A missing file is not an error.
pub fn load(path: &Path) -> Result<Option<Value>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    ConfigFormat::from_path(path)
        .parse(&content)
        .map(Some)
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
}
