/// Canonical file paths for PerfMode data files.
///
/// Both files live under `<config dir>/PerfMode/` (`%APPDATA%` on Windows,
/// `$XDG_CONFIG_HOME` or `~/.config` on Linux):
///   - config.toml  Written by the user or a front end, read by the daemon.
///   - status.toml  Written by the daemon, read by display layers.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "PerfMode";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the PerfMode application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no per-user config directory on this platform")?;
    Ok(base.join(APP_DIR_NAME))
}

/// Returns `<dir>/config.toml`.
pub fn config_file_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Returns `<dir>/status.toml`.
pub fn status_file_path(dir: &Path) -> PathBuf {
    dir.join(STATUS_FILE_NAME)
}
