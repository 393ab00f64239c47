//! Application settings
//!
//! Read from `settings.toml` in the config dir, then overridden by `STUFF_*`
//! environment variables. Every field has a default, so an empty or missing
//! file is a valid configuration.

use crate::PathManager;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not determine settings path")]
    NoConfigDir,
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write settings: {0}")]
    Write(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub files: FileSettings,
    pub tags: TagSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; defaults to `stuff.db` in the data dir
    pub path: Option<PathBuf>,
    /// Log every SQL statement at debug level
    pub debug_sql: bool,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    /// Root of the blob tree; defaults to `files` in the data dir
    pub dir: Option<PathBuf>,
    /// Scratch dir for uploads in progress; defaults to the OS temp dir
    pub tmp_dir: Option<PathBuf>,
    /// URL prefix under which blobs are served
    pub public_prefix: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            dir: None,
            tmp_dir: None,
            public_prefix: "/assets/files".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TagSettings {
    /// One of nanoid, ksuid, uuid, sequential
    pub algorithm: String,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            algorithm: "nanoid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Write to a rolling file in the logs dir instead of stderr
    pub to_file: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: false,
        }
    }
}

impl Settings {
    /// Load from the default settings file (if any) and apply env overrides.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match PathManager::settings_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load a specific file without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `STUFF_*` overrides looked up through `var`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(path) = var("STUFF_DATABASE_PATH") {
            self.database.path = Some(path.into());
        }
        if let Some(dir) = var("STUFF_FILE_DIR") {
            self.files.dir = Some(dir.into());
        }
        if let Some(dir) = var("STUFF_TMP_DIR") {
            self.files.tmp_dir = Some(dir.into());
        }
        if let Some(algorithm) = var("STUFF_TAG_ALGORITHM") {
            self.tags.algorithm = algorithm;
        }
        if let Some(level) = var("STUFF_LOG_LEVEL") {
            self.log.level = level;
        }
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = PathManager::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(PathManager::db_path)
            .unwrap_or_else(|| PathBuf::from("stuff.db"))
    }

    pub fn files_dir(&self) -> PathBuf {
        self.files
            .dir
            .clone()
            .or_else(PathManager::files_dir)
            .unwrap_or_else(|| PathBuf::from("files"))
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.files.tmp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_file() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tags.algorithm, "nanoid");
        assert_eq!(settings.files.public_prefix, "/assets/files");
    }

    #[test]
    fn test_partial_file() {
        let settings: Settings = toml::from_str(
            r#"
            [tags]
            algorithm = "sequential"

            [database]
            debug_sql = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.tags.algorithm, "sequential");
        assert!(settings.database.debug_sql);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STUFF_FILE_DIR", "/srv/stuff/files"),
            ("STUFF_TMP_DIR", ""),
            ("STUFF_TAG_ALGORITHM", "ksuid"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.files_dir(), PathBuf::from("/srv/stuff/files"));
        assert_eq!(settings.tags.algorithm, "ksuid");
        // empty values are ignored
        assert_eq!(settings.files.tmp_dir, None);
        assert_eq!(settings.tmp_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.database.path = Some(dir.path().join("inventory.db"));
        settings.log.to_file = true;
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "tags = 5").unwrap();

        assert!(matches!(Settings::load_from(&path), Err(SettingsError::Parse(_))));
        assert!(matches!(
            Settings::load_from(&dir.path().join("missing.toml")),
            Err(SettingsError::Read { .. })
        ));
    }
}
