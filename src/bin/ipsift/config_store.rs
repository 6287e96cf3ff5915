use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ipsift::RunConfig;

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "filesystem error: {}", err),
            ConfigError::Parse(err) => write!(f, "invalid config file: {}", err),
            ConfigError::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Parse(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        ConfigError::Invalid(value.to_string())
    }
}

/// TOML-backed [`RunConfig`]. A missing file means defaults.
pub struct ConfigStore {
    path: PathBuf,
    pub data: RunConfig,
}

impl ConfigStore {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_path);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self {
                path,
                data: RunConfig::default(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let data: RunConfig = toml::from_str(&content)?;
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = toml::to_string_pretty(&self.data)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }

    /// Write a template with placeholder store settings; refuses to overwrite.
    pub fn create_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_path);
        if path.exists() {
            return Err(ConfigError::Invalid(format!(
                "{} already exists",
                path.display()
            )));
        }
        let store = Self {
            path,
            data: RunConfig {
                worker_url: "https://your-worker.your-subdomain.workers.dev".into(),
                worker_api_key: "your-api-key-here".into(),
                ..RunConfig::default()
            },
        };
        store.save()?;
        Ok(store)
    }
}

pub fn default_path() -> PathBuf {
    resolve_config_dir().join("config.toml")
}

fn resolve_config_dir() -> PathBuf {
    if let Some(val) = env::var_os("IPSIFT_CONFIG_DIR") {
        let path = PathBuf::from(val);
        if path.is_absolute() {
            return path;
        }
        return env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| PathBuf::from("."));
    }
    if let Some(base) = dirs::config_dir() {
        return base.join("ipsift");
    }
    PathBuf::from(".ipsift")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipsift::Action;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(store.data, RunConfig::default());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let store = ConfigStore {
            path: path.clone(),
            data: RunConfig {
                worker_url: "https://kv.example.dev".into(),
                default_action: Action::Append,
                sample_seed: Some(9),
                ..RunConfig::default()
            },
        };
        store.save().unwrap();
        let loaded = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(loaded.data, store.data);
    }
}
