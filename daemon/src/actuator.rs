/// The single "apply mode" boundary shared by the arbiter and the command server.
///
/// Everything downstream of a mode change (firmware calls, fan curves, UI) lives
/// behind [`ModeActuator`]. Implementations must tolerate concurrent calls,
/// including concurrent calls with themselves.
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::config::ActuatorConfig;
use crate::error::ActuatorError;
use crate::mode::{Mode, ModeOrigin};
use crate::status::{write_status, DaemonStatus};

/// How often a running actuator command is checked for exit.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub trait ModeActuator: Send + Sync {
    /// Applies `mode`. `origin` is carried through for display purposes only.
    fn apply_mode(&self, mode: Mode, origin: ModeOrigin) -> Result<(), ActuatorError>;

    /// Name of the active mode, for display.
    fn current_mode_name(&self) -> String;
}

/// Runs [`ModeActuator::apply_mode`] on tokio's blocking pool so a slow
/// actuator never stalls the accept loop or the arbiter's timer.
pub async fn apply_blocking(
    actuator: Arc<dyn ModeActuator>,
    mode: Mode,
    origin: ModeOrigin,
) -> Result<(), ActuatorError> {
    tokio::task::spawn_blocking(move || actuator.apply_mode(mode, origin))
        .await
        .map_err(|e| ActuatorError::Aborted(e.to_string()))?
}

/// Daemon actuator: optionally runs a configured program, then records the
/// change in the status file read by display layers.
pub struct StatusActuator {
    status_path: PathBuf,
    settings: RwLock<ActuatorConfig>,
    /// Only held while recording, never while the external program runs.
    status: Mutex<DaemonStatus>,
}

impl StatusActuator {
    pub fn new(status_path: PathBuf, settings: ActuatorConfig) -> Self {
        let status = DaemonStatus::new();
        write_status(&status_path, &status);
        Self {
            status_path,
            settings: RwLock::new(settings),
            status: Mutex::new(status),
        }
    }

    /// Replaces the external command and its timeout after a config reload.
    pub fn set_settings(&self, settings: ActuatorConfig) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn set_ipc_listening(&self, listening: bool) {
        self.update(|s| s.ipc_listening = listening);
    }

    pub fn snapshot(&self) -> DaemonStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutates the status and rewrites the status file.
    pub fn update(&self, f: impl FnOnce(&mut DaemonStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
        write_status(&self.status_path, &status);
    }
}

impl ModeActuator for StatusActuator {
    fn apply_mode(&self, mode: Mode, origin: ModeOrigin) -> Result<(), ActuatorError> {
        let settings = self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if !settings.command.is_empty() {
            if let Err(e) = run_command(&settings.command, mode, settings.timeout()) {
                self.update(|s| s.error = Some(e.to_string()));
                return Err(e);
            }
        }

        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.record_change(mode, origin);
        write_status(&self.status_path, &status);
        if let Some(label) = status.label() {
            tracing::info!(index = mode.index(), "Performance mode: {label}");
        }
        Ok(())
    }

    fn current_mode_name(&self) -> String {
        self.snapshot()
            .current_mode
            .map(|m| m.display_name().to_string())
            .unwrap_or_default()
    }
}

/// Substitutes `{mode}` and `{index}` in each argument.
pub fn expand_command(template: &[String], mode: Mode) -> Result<Vec<String>, ActuatorError> {
    if template.is_empty() {
        return Err(ActuatorError::EmptyCommand);
    }
    Ok(template
        .iter()
        .map(|arg| {
            arg.replace("{mode}", mode.token())
                .replace("{index}", &mode.index().to_string())
        })
        .collect())
}

/// Runs the expanded command, killing it once `timeout` has passed.
fn run_command(template: &[String], mode: Mode, timeout: Duration) -> Result<(), ActuatorError> {
    let argv = expand_command(template, mode)?;
    let (program, args) = argv.split_first().ok_or(ActuatorError::EmptyCommand)?;
    let spawn_error = |source: std::io::Error| ActuatorError::Spawn {
        program: program.clone(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .spawn()
        .map_err(spawn_error)?;

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().map_err(spawn_error)? {
            break status;
        }
        if started.elapsed() >= timeout {
            tracing::warn!(pid = child.id(), %program, ?timeout, "actuator command timed out; killing");
            let _ = child.kill();
            let _ = child.wait();
            return Err(ActuatorError::Timeout {
                program: program.clone(),
                timeout,
            });
        }
        std::thread::sleep(CHILD_POLL_INTERVAL);
    };

    if !status.success() {
        return Err(ActuatorError::Failed {
            program: program.clone(),
            status,
        });
    }
    Ok(())
}
