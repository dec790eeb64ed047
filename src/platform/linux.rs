use std::env;
use std::path::PathBuf;

fn home() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
}

/// `$XDG_CONFIG_HOME/linkshelf` or `~/.config/linkshelf`.
pub fn config_dir() -> PathBuf {
    match env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("linkshelf"),
        _ => home().join(".config").join("linkshelf"),
    }
}

/// `$XDG_DATA_HOME/linkshelf` or `~/.local/share/linkshelf`.
pub fn data_dir() -> PathBuf {
    match env::var("XDG_DATA_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("linkshelf"),
        _ => home().join(".local").join("share").join("linkshelf"),
    }
}
