//! Service configuration management.
//!
//! Configuration is stored as TOML:
//! - `$FILEXFER_CONFIG` when set
//! - Linux: `~/.config/filexfer/store-service.toml`
//! - Windows: `%APPDATA%/filexfer/store-service.toml`

use std::path::{Path, PathBuf};

use filexfer_protocol::constants::FABRIC_MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration file location.
const CONFIG_ENV: &str = "FILEXFER_CONFIG";

/// Store service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory completed files are published into.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Directory for in-progress transfers (`<storage_dir>/.workdir` if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// WebSocket server port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Service instance id appended to the file-store topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,

    /// Largest accepted WebSocket message in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_storage_dir() -> PathBuf {
    home_dir().join("filexfer").join("storage")
}

fn default_port() -> u16 {
    8765
}

fn default_max_message_size() -> usize {
    FABRIC_MAX_MESSAGE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            working_dir: None,
            port: default_port(),
            service_id: None,
            max_message_size: default_max_message_size(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save_to(path)?;
            config
        };

        config.storage_dir = expand_home(&config.storage_dir);
        config.working_dir = config.working_dir.as_deref().map(expand_home);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE").unwrap_or_else(|_| "C:\\Users\\Default".into());
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
}

/// Replaces a leading `~` component with the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
            .join("filexfer")
            .join("store-service.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir()
            .join(".config")
            .join("filexfer")
            .join("store-service.toml")
    }
}
