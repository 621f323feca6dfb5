use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory holding the managed uploads.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Directory holding generated thumbnails.
    #[serde(default = "default_thumbnail_dir")]
    pub thumbnail_dir: PathBuf,

    /// Bounding box for generated thumbnails, in pixels.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("metadata.sqlite3")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_thumbnail_dir() -> PathBuf {
    PathBuf::from("thumbnails")
}

fn default_thumbnail_size() -> u32 {
    240
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            upload_dir: default_upload_dir(),
            thumbnail_dir: default_thumbnail_dir(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl Config {
    /// Load from the given file, or from the default location when `path` is
    /// `None`. A missing config file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", config_path.display())))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shoebox")
            .join("config.toml")
    }

    pub fn upload_path(&self, fname: &str) -> PathBuf {
        self.upload_dir.join(fname)
    }

    pub fn thumbnail_path(&self, fname: &str) -> PathBuf {
        self.thumbnail_dir.join(fname)
    }

    /// Create the upload and thumbnail directories when missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.thumbnail_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.thumbnail_size, 240);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "thumbnail_size = 512\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.thumbnail_size, 512);
        assert_eq!(config.db_path, PathBuf::from("metadata.sqlite3"));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.upload_dir = dir.path().join("media");
        config.save(Some(&path)).unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.upload_dir, dir.path().join("media"));
    }
}
