use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use adbkit::navigator::DEFAULT_START_PATH;
use adbkit::transfer::DEFAULT_STREAM_BUFFER;
use adbkit::{CommandViewer, TransferConfig};

use crate::ui;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("droidscope"))
}

/// Get the config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Settings read from ~/.config/droidscope/config.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Explicit adb executable; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adb_path: Option<String>,

    #[serde(default)]
    pub allow_system_access: bool,

    #[serde(default = "default_start_path")]
    pub start_path: String,

    /// Human-readable size, e.g. "10MB"
    #[serde(default = "default_large_file_min_size")]
    pub large_file_min_size: String,

    #[serde(default = "default_stream_buffer_secs")]
    pub stream_buffer_secs: u64,

    /// Command line used to open previews and streams; system default if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<String>,

    /// Root for cached pulls; the OS temp directory if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_root: Option<String>,
}

fn default_start_path() -> String {
    DEFAULT_START_PATH.to_string()
}

fn default_large_file_min_size() -> String {
    "10MB".to_string()
}

fn default_stream_buffer_secs() -> u64 {
    DEFAULT_STREAM_BUFFER.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_path: None,
            allow_system_access: false,
            start_path: default_start_path(),
            large_file_min_size: default_large_file_min_size(),
            stream_buffer_secs: default_stream_buffer_secs(),
            viewer: None,
            scratch_root: None,
        }
    }
}

impl Config {
    /// Load the config, falling back to defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        toml::from_str(&content).context("Invalid TOML format in droidscope config")
    }

    /// Save the config to ~/.config/droidscope/config.toml
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Expanded adb path, if one is configured
    pub fn adb_path(&self) -> Option<PathBuf> {
        self.adb_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }

    pub fn large_file_min_size(&self) -> Result<u64> {
        ui::parse_size(&self.large_file_min_size)
            .map_err(|e| anyhow::anyhow!("large_file_min_size: {e}"))
    }

    pub fn transfer_config(&self) -> TransferConfig {
        let config =
            TransferConfig::default().with_buffer(Duration::from_secs(self.stream_buffer_secs));
        match &self.scratch_root {
            Some(root) => config.with_scratch_root(PathBuf::from(shellexpand::tilde(root).as_ref())),
            None => config,
        }
    }

    pub fn viewer(&self) -> CommandViewer {
        self.viewer
            .as_deref()
            .and_then(CommandViewer::from_command_line)
            .unwrap_or_else(CommandViewer::system_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.start_path, "/sdcard/");
        assert_eq!(config.stream_buffer_secs, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "allow_system_access = true\nviewer = \"mpv --fs\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.allow_system_access);
        assert_eq!(config.viewer.as_deref(), Some("mpv --fs"));
        assert_eq!(config.large_file_min_size, "10MB");
        assert_eq!(config.viewer().program(), "mpv");
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let config = Config {
            adb_path: Some("/opt/platform-tools/adb".to_string()),
            stream_buffer_secs: 8,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "stream_buffer_secs = \"soon\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_adb_path_expands_tilde() {
        let config = Config {
            adb_path: Some("~/android/adb".to_string()),
            ..Config::default()
        };
        let path = config.adb_path().unwrap();
        assert!(!path.starts_with("~"));
        assert!(path.ends_with("android/adb"));
    }

    #[test]
    fn test_large_file_min_size() {
        assert_eq!(
            Config::default().large_file_min_size().unwrap(),
            10 * 1024 * 1024
        );
        let bad = Config {
            large_file_min_size: "lots".to_string(),
            ..Config::default()
        };
        assert!(bad.large_file_min_size().is_err());
    }

    #[test]
    fn test_transfer_config_buffer() {
        let config = Config {
            stream_buffer_secs: 2,
            scratch_root: Some("/tmp/ds-cache".to_string()),
            ..Config::default()
        };
        let transfer = config.transfer_config();
        assert_eq!(transfer.buffer, Duration::from_secs(2));
        assert!(transfer.scratch_root.starts_with("/tmp/ds-cache"));
    }
}
