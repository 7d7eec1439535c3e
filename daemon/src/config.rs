use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::event::DaemonEvent;
use crate::pattern::PatternBook;

pub const DEFAULT_IPC_PORT: u16 = 12345;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
pub const MIN_READ_TIMEOUT_MS: u64 = 100;
pub const MAX_READ_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_ACTUATOR_TIMEOUT_MS: u64 = 5_000;

/// Config shared between the arbiter, the watcher and the event loop.
pub type SharedConfig = Arc<RwLock<Config>>;

/// What the arbiter does when no pattern list matches a running process.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoMatchPolicy {
    /// Switch to Silent, the lowest mode.
    #[default]
    #[serde(rename = "silent")]
    FallbackToSilent,
    /// Leave the current mode alone.
    #[serde(rename = "keep", alias = "none")]
    Keep,
}

/// Root configuration. Deserialized from `<config dir>/PerfMode/config.toml`.
///
/// The `process_map_*` keys are written by whatever front end the user edits
/// their lists with; the daemon only reads them.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    /// Master switch for automatic mode selection.
    #[serde(default)]
    pub process_map_enabled: bool,
    /// Log every arbitration decision at info level.
    #[serde(default)]
    pub process_map_verbose: bool,
    /// Pattern lists, separated by newlines, commas or semicolons.
    #[serde(default)]
    pub process_map_silent: String,
    #[serde(default)]
    pub process_map_performance: String,
    #[serde(default)]
    pub process_map_turbo: String,
    #[serde(default)]
    pub process_map_fallback: NoMatchPolicy,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
}

impl Config {
    /// Compiles the three pattern lists.
    pub fn pattern_book(&self) -> PatternBook {
        PatternBook::compile(
            &self.process_map_turbo,
            &self.process_map_performance,
            &self.process_map_silent,
        )
    }
}

/// Loopback command server settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IpcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long the server waits for a request line. Clamped to [100 ms, 60 s].
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// How long the client waits to connect to a running instance.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_IPC_PORT,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl IpcConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(
            self.read_timeout_ms
                .clamp(MIN_READ_TIMEOUT_MS, MAX_READ_TIMEOUT_MS),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Optional external program run on every mode change.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ActuatorConfig {
    /// Program and arguments. `{mode}` expands to the wire token and `{index}`
    /// to the numeric ordinal, e.g. `["powerprofilesctl", "set", "{mode}"]`.
    #[serde(default)]
    pub command: Vec<String>,
    /// The program is killed if it has not exited by then.
    #[serde(default = "default_actuator_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_ms: DEFAULT_ACTUATOR_TIMEOUT_MS,
        }
    }
}

impl ActuatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Reads the config at `path`. A missing file is not an error and yields the
/// defaults; an unreadable or malformed one is.
pub fn load_or_default(path: &Path) -> Result<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("cannot read {}", path.display()));
        }
    };
    toml::from_str(&content).with_context(|| format!("invalid config in {}", path.display()))
}

/// Anchors `path` to the working directory so that a bare `config.toml`
/// still has a directory to watch and to put `status.toml` next to.
pub fn resolve_config_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("cannot resolve config path {}", path.display()))
}

/// Directory holding the config file; notify watches it rather than the file
/// itself because editors often save by renaming a temp file over the original.
pub fn config_dir(path: &Path) -> Result<PathBuf> {
    let path = resolve_config_path(path)?;
    path.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("config path {} has no parent directory", path.display()))
}

/// Sends `ConfigReloaded` whenever the config file is created or modified and
/// parses cleanly. A file that fails to parse keeps the previous config.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let resolved = resolve_config_path(&path).and_then(|path| Ok((config_dir(&path)?, path)));
    let (watch_dir, path) = match resolved {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("config hot reload disabled: {e:#}");
            return;
        }
    };

    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);
    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    )
    .and_then(|mut w| w.watch(&watch_dir, RecursiveMode::NonRecursive).map(|()| w));
    let _watcher = match watcher {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(dir = %watch_dir.display(), error = %e, "config hot reload disabled");
            return;
        }
    };
    tracing::debug!(path = %path.display(), "watching config");

    while let Some(event) = watch_rx.recv().await {
        let written = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );
        if !written || !event.paths.iter().any(|p| p == &path) {
            continue;
        }

        match load_or_default(&path) {
            Ok(config) => {
                if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("keeping previous config: {e:#}"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_IPC_PORT
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_actuator_timeout_ms() -> u64 {
    DEFAULT_ACTUATOR_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use std::collections::BTreeSet;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn config_default_is_disabled_with_empty_lists() {
        let c = Config::default();
        assert!(!c.process_map_enabled);
        assert!(!c.process_map_verbose);
        assert!(c.process_map_turbo.is_empty());
        assert_eq!(c.process_map_fallback, NoMatchPolicy::FallbackToSilent);
    }

    #[test]
    fn ipc_config_default_values() {
        let ipc = IpcConfig::default();
        assert!(ipc.enabled);
        assert_eq!(ipc.port, DEFAULT_IPC_PORT);
        assert_eq!(ipc.read_timeout(), Duration::from_millis(DEFAULT_READ_TIMEOUT_MS));
        assert_eq!(ipc.connect_timeout(), Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));
    }

    // ── read_timeout clamping ─────────────────────────────────────────────────

    #[test]
    fn read_timeout_clamps_below_min() {
        let ipc = IpcConfig { read_timeout_ms: 1, ..IpcConfig::default() };
        assert_eq!(ipc.read_timeout(), Duration::from_millis(MIN_READ_TIMEOUT_MS));
    }

    #[test]
    fn read_timeout_clamps_above_max() {
        let ipc = IpcConfig { read_timeout_ms: u64::MAX, ..IpcConfig::default() };
        assert_eq!(ipc.read_timeout(), Duration::from_millis(MAX_READ_TIMEOUT_MS));
    }

    // ── pattern_book ──────────────────────────────────────────────────────────

    #[test]
    fn pattern_book_routes_each_list_to_its_mode() {
        let c = Config {
            process_map_turbo: "game".into(),
            process_map_performance: "blender".into(),
            process_map_silent: "notepad".into(),
            ..Config::default()
        };
        let book = c.pattern_book();
        let live: BTreeSet<String> = ["blender".to_string()].into();
        assert_eq!(book.resolve(&live), Some((Mode::Balanced, "blender")));
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
process_map_enabled = true
process_map_verbose = true
process_map_turbo = "RocketLeague.exe; cyberpunk*"
process_map_performance = """
blender
davinci*
"""
process_map_silent = "notepad"
process_map_fallback = "keep"

[ipc]
port = 23456
read_timeout_ms = 750

[actuator]
command = ["powerprofilesctl", "set", "{mode}"]
timeout_ms = 1500
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert!(config.process_map_enabled);
        assert!(config.process_map_verbose);
        assert_eq!(config.process_map_turbo, "RocketLeague.exe; cyberpunk*");
        assert_eq!(config.process_map_silent, "notepad");
        assert_eq!(config.process_map_fallback, NoMatchPolicy::Keep);
        assert_eq!(config.ipc.port, 23456);
        assert_eq!(config.ipc.read_timeout(), Duration::from_millis(750));
        assert!(config.ipc.enabled);
        assert_eq!(config.actuator.command, ["powerprofilesctl", "set", "{mode}"]);
        assert_eq!(config.actuator.timeout(), Duration::from_millis(1500));
        assert_eq!(config.pattern_book().performance.len(), 2);
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ipc]\nport = 4000\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.ipc.port, 4000);
        assert_eq!(config.ipc.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert!(!config.process_map_enabled);
        assert!(config.actuator.command.is_empty());
        assert_eq!(config.actuator.timeout_ms, DEFAULT_ACTUATOR_TIMEOUT_MS);
    }

    #[test]
    fn fallback_accepts_none_alias() {
        let config: Config = toml::from_str("process_map_fallback = \"none\"").unwrap();
        assert_eq!(config.process_map_fallback, NoMatchPolicy::Keep);
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_default_rejects_unknown_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "process_map_fallback = \"turbo\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    // ── config paths ──────────────────────────────────────────────────────────

    #[test]
    fn bare_file_name_resolves_against_working_dir() {
        let cwd = std::env::current_dir().unwrap();
        let path = resolve_config_path(Path::new("config.toml")).unwrap();
        assert!(path.is_absolute());
        assert_eq!(path, cwd.join("config.toml"));
        assert_eq!(config_dir(Path::new("config.toml")).unwrap(), cwd);
    }

    #[test]
    fn absolute_path_keeps_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(resolve_config_path(&path).unwrap(), path);
        assert_eq!(config_dir(&path).unwrap(), dir.path());
    }

    #[test]
    fn load_or_default_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_default(dir.path()).is_err());
    }

    // ── watch_config ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn watch_config_reports_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "process_map_enabled = false\n").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let watcher = tokio::spawn(watch_config(path.clone(), tx));
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, "process_map_enabled = true\n").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(DaemonEvent::ConfigReloaded(c)) if c.process_map_enabled => break c,
                    Some(_) => continue,
                    None => panic!("watcher exited"),
                }
            }
        })
        .await
        .expect("no reload after edit");
        assert!(event.process_map_enabled);
        watcher.abort();
    }
}
