use std::path::PathBuf;
use std::sync::OnceLock;
use directories::BaseDirs;

static DATA_DIR_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

pub struct PathManager;

impl PathManager {
    /// Set a custom data directory (portable installs, tests)
    pub fn set_data_dir(path: PathBuf) {
        let _ = DATA_DIR_OVERRIDE.set(path);
    }

    fn base_data_dir() -> Option<PathBuf> {
        if let Some(d) = DATA_DIR_OVERRIDE.get() {
            return Some(d.clone());
        }
        BaseDirs::new().map(|d| d.data_dir().join("stuff"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        Self::base_data_dir()
    }

    pub fn config_dir() -> Option<PathBuf> {
        if DATA_DIR_OVERRIDE.get().is_some() {
            return Self::data_dir();
        }
        BaseDirs::new().map(|d| d.config_dir().join("stuff"))
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("stuff.db"))
    }

    /// Root of the content-addressed blob tree
    pub fn files_dir() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("files"))
    }

    pub fn logs_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if DATA_DIR_OVERRIDE.get().is_none() {
                if let Some(dirs) = directories::UserDirs::new() {
                    return Some(dirs.home_dir().join("Library/Logs/Stuff"));
                }
            }
        }
        Self::data_dir().map(|d| d.join("logs"))
    }

    pub fn log_file_name() -> &'static str {
        "stuff.log"
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("settings.toml"))
    }

    pub fn ensure_dirs_exist() -> std::io::Result<()> {
        for dir in [Self::data_dir(), Self::config_dir(), Self::logs_dir()]
            .into_iter()
            .flatten()
        {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
