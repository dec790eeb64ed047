//! Per-OS locations for the config file and the local database.

use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as os;
#[cfg(target_os = "macos")]
use macos as os;
#[cfg(target_os = "windows")]
use windows as os;

/// Overrides [`get_data_dir`] when set.
pub const DATA_DIR_ENV: &str = "LINKSHELF_DATA_DIR";

/// Directory holding `config.json`.
///
/// - **Linux**: `$XDG_CONFIG_HOME/linkshelf`, else `~/.config/linkshelf`
/// - **macOS**: `~/Library/Preferences/Linkshelf`
/// - **Windows**: `%APPDATA%/Linkshelf/config`
pub fn get_config_dir() -> PathBuf {
    os::config_dir()
}

/// Directory holding the local SQLite database. `LINKSHELF_DATA_DIR` wins.
///
/// - **Linux**: `$XDG_DATA_HOME/linkshelf`, else `~/.local/share/linkshelf`
/// - **macOS**: `~/Library/Application Support/Linkshelf`
/// - **Windows**: `%APPDATA%/Linkshelf/data`
pub fn get_data_dir() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => os::data_dir(),
    }
}
