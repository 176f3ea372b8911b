//! Application configuration and on-disk locations.

use std::path::{Path, PathBuf};

use omb_pty::LaunchConfig;
use serde::{Deserialize, Serialize};

/// Top-level config file contents. Every field has a default, so a partial
/// file is fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub launch: LaunchConfig,
    pub terminal: TerminalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TerminalConfig {
    /// Size used until the UI reports a real one.
    pub default_cols: u16,
    pub default_rows: u16,
    /// Window within which resize requests are coalesced.
    pub resize_debounce_ms: u64,
    /// Close a tab when its process exits.
    pub auto_close_on_exit: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_cols: 80,
            default_rows: 24,
            resize_debounce_ms: 100,
            auto_close_on_exit: true,
        }
    }
}

/// `~/.config/onemanband/config.json`
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".config")
        .join("onemanband")
        .join("config.json")
}

/// `~/.onemanband`, home of the pid files.
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".onemanband")
}

pub fn pids_dir() -> PathBuf {
    state_dir().join("pids")
}

impl AppConfig {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Read the config at `path`. A missing file gives the defaults; so does
    /// a malformed one, with a warning.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[Config] No config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                log::warn!("[Config] Failed to read {}: {e}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("[Config] Ignoring malformed {}: {e}", path.display());
                Self::default()
            }
        }
    }
}
