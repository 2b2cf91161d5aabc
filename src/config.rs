use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::migrate::DEFAULT_CHUNK_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "tasklift.yaml";
pub const DEFAULT_CONNECTION: &str = "legacy_mysql";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub target: DatabaseConfig,
    #[serde(default)]
    pub connections: BTreeMap<String, DatabaseConfig>,
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Config {
    pub fn new(legacy: PathBuf, target: PathBuf) -> Self {
        Self {
            target: DatabaseConfig { path: target },
            connections: BTreeMap::from([(
                DEFAULT_CONNECTION.to_string(),
                DatabaseConfig { path: legacy },
            )]),
            defaults: Defaults::default(),
        }
    }

    /// Read a config file, resolving relative database paths against the
    /// directory that holds it.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MigrateError::ConfigNotFound(path.display().to_string()));
        }
        let data = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config.resolved_for(path))
    }

    /// Copy of this config as it will read once written to `config_path`.
    pub fn resolved_for(&self, config_path: &Path) -> Self {
        let mut config = self.clone();
        let base = config_path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve_paths(base);
        config
    }

    /// Write this config, refusing to replace an existing file.
    pub fn write_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(MigrateError::AlreadyInitialized(path.display().to_string()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn connection(&self, name: &str) -> Result<&DatabaseConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| MigrateError::ConnectionNotFound(name.to_string()))
    }

    fn resolve_paths(&mut self, base: &Path) {
        resolve(&mut self.target.path, base);
        for connection in self.connections.values_mut() {
            resolve(&mut connection.path, base);
        }
    }
}

fn resolve(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}
