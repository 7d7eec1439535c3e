use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::mode::{display_label, Mode, ModeOrigin};

/// Runtime status written by the daemon to `<config dir>/PerfMode/status.toml`.
/// Display layers (tray, overlay, scripts) read this file and never write it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Most recently applied mode, if any change has happened yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_mode: Option<Mode>,
    /// True when the most recent change came from the CLI or IPC rather than the watcher.
    #[serde(default)]
    pub mode_manual: bool,
    /// RFC 3339 timestamp of the most recent change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<String>,
    /// Whether the loopback command server is accepting connections.
    #[serde(default)]
    pub ipc_listening: bool,
    /// Last non-fatal error, cleared by the next successful change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            current_mode: None,
            mode_manual: false,
            last_change: None,
            ipc_listening: false,
            error: None,
        }
    }

    /// Records a successful mode change.
    pub fn record_change(&mut self, mode: Mode, origin: ModeOrigin) {
        self.current_mode = Some(mode);
        self.mode_manual = !origin.is_automatic();
        self.last_change = Some(chrono::Local::now().to_rfc3339());
        self.error = None;
    }

    /// Text for an overlay or tray tooltip, e.g. `"[A] Turbo"`.
    pub fn label(&self) -> Option<String> {
        let origin = if self.mode_manual {
            ModeOrigin::Manual
        } else {
            ModeOrigin::Auto
        };
        self.current_mode.map(|mode| display_label(mode, origin))
    }
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`, creating the parent
/// directory if needed. Failures are logged; a status write never stops the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(dir = %parent.display(), error = %e, "failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write status file");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialize status"),
    }
}
