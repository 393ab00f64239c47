pub mod paths;
pub mod settings;

pub use paths::PathManager;
pub use settings::{
    DatabaseSettings, FileSettings, LogSettings, Settings, SettingsError, TagSettings,
};

/// Load environment variables from .env files.
/// dotenv never overwrites a variable that is already set, so ./.env is
/// read before ~/.env to give the project file precedence.
/// Call this before parsing CLI args so `STUFF_*` overrides are visible.
pub fn load_env_file() {
    dotenv::dotenv().ok();

    if let Some(home) = dirs::home_dir() {
        dotenv::from_path(home.join(".env")).ok();
    }
}
