/// Mode Arbiter: picks a performance mode from the running process list.
///
/// A single background task polls the process table, resolves the winning
/// mode with priority Turbo > Performance > Silent and calls the actuator only
/// when the result differs from what the arbiter itself applied last. It never
/// reads back the actuator's state, so a manual override stays in place until
/// the resolved mode changes.
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actuator::{apply_blocking, ModeActuator};
use crate::config::{NoMatchPolicy, SharedConfig};
use crate::error::{ArbiterError, ScanError};
use crate::mode::{Mode, ModeOrigin};
use crate::pattern::PatternBook;
use crate::process_monitor::ProcessSource;

pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);
pub const ERROR_BACKOFF: Duration = Duration::from_millis(3000);

/// Result of one arbitration cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `process_map_enabled` is off; memory was cleared.
    Disabled,
    /// Nothing matched and the policy is to keep the current mode.
    NoMatch,
    /// The resolved mode equals the last one applied; nothing was called.
    Unchanged(Mode),
    /// The actuator was called with this mode.
    Applied(Mode),
}

struct Shared {
    config: SharedConfig,
    actuator: Arc<dyn ModeActuator>,
    source: Mutex<Box<dyn ProcessSource>>,
    /// Swapped as a whole on reload, never edited in place.
    patterns: RwLock<Arc<PatternBook>>,
    last_applied: Mutex<Option<Mode>>,
}

struct LoopHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Arbiter {
    shared: Arc<Shared>,
    task: Option<LoopHandle>,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl Arbiter {
    pub fn new(
        config: SharedConfig,
        actuator: Arc<dyn ModeActuator>,
        source: impl ProcessSource + 'static,
    ) -> Self {
        let source: Box<dyn ProcessSource> = Box::new(source);
        Self {
            shared: Arc::new(Shared {
                config,
                actuator,
                source: Mutex::new(source),
                patterns: RwLock::new(Arc::new(PatternBook::default())),
                last_applied: Mutex::new(None),
            }),
            task: None,
            poll_interval: POLL_INTERVAL,
            error_backoff: ERROR_BACKOFF,
        }
    }

    /// Overrides the tick and back-off intervals.
    pub fn with_intervals(mut self, poll_interval: Duration, error_backoff: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.error_backoff = error_backoff;
        self
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Mode most recently applied by the arbiter, if any.
    pub fn last_applied(&self) -> Option<Mode> {
        *self.shared.last_applied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compiles the pattern lists, applies once immediately, then starts polling.
    pub async fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("process watcher already running");
            return;
        }

        self.reload_mappings().await;

        let first_delay = match self.shared.poll_once().await {
            Ok(_) => self.poll_interval,
            Err(e) => {
                tracing::warn!(error = %e, "initial process scan failed");
                self.error_backoff
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            cancel.clone(),
            first_delay,
            self.poll_interval,
            self.error_backoff,
        ));
        self.task = Some(LoopHandle { cancel, handle });
        tracing::info!(interval = ?self.poll_interval, "process watcher started");
    }

    /// Cancels the loop, waits for it to exit and forgets the last applied mode.
    /// No-op when already stopped.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            tracing::warn!(error = %e, "process watcher task ended abnormally");
        }
        *self.shared.last_applied.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("process watcher stopped");
    }

    /// Recompiles the pattern lists from the current config. The running loop
    /// picks them up on its next tick; last-applied memory is untouched.
    pub async fn reload_mappings(&self) {
        let book = self.shared.config.read().await.pattern_book();
        tracing::info!(
            silent = book.silent.len(),
            performance = book.performance.len(),
            turbo = book.turbo.len(),
            "process mappings loaded"
        );
        tracing::debug!(
            silent = ?book.silent.sources().collect::<Vec<_>>(),
            performance = ?book.performance.sources().collect::<Vec<_>>(),
            turbo = ?book.turbo.sources().collect::<Vec<_>>(),
            "process patterns"
        );
        *self.shared.patterns.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(book);
    }

    /// Runs one arbitration cycle.
    pub async fn poll_once(&self) -> Result<PollOutcome, ArbiterError> {
        self.shared.poll_once().await
    }
}

impl Drop for Arbiter {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.cancel.cancel();
        }
    }
}

impl Shared {
    async fn poll_once(self: &Arc<Self>) -> Result<PollOutcome, ArbiterError> {
        let (enabled, verbose, policy) = {
            let config = self.config.read().await;
            (
                config.process_map_enabled,
                config.process_map_verbose,
                config.process_map_fallback,
            )
        };

        if !enabled {
            // Forget so that re-enabling applies even an unchanged mode.
            *self.last_applied.lock().unwrap_or_else(PoisonError::into_inner) = None;
            return Ok(PollOutcome::Disabled);
        }

        // sysinfo walks the whole process table; keep it off the async workers.
        let scanner = Arc::clone(self);
        let names = tokio::task::spawn_blocking(move || {
            scanner
                .source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot()
        })
        .await
        .map_err(|e| ScanError::Other(format!("scan task aborted: {e}")))??;
        let book = Arc::clone(&self.patterns.read().unwrap_or_else(PoisonError::into_inner));

        let target = match book.resolve(&names) {
            Some((mode, name)) => {
                let decision = format!("match '{name}' -> {} ({})", mode.display_name(), mode.index());
                log_decision(verbose, &decision);
                mode
            }
            None => match policy {
                NoMatchPolicy::FallbackToSilent => {
                    log_decision(verbose, "no matches -> fallback to Silent (2)");
                    Mode::Silent
                }
                NoMatchPolicy::Keep => {
                    log_decision(verbose, "no matches -> keeping current mode");
                    return Ok(PollOutcome::NoMatch);
                }
            },
        };

        if *self.last_applied.lock().unwrap_or_else(PoisonError::into_inner) == Some(target) {
            return Ok(PollOutcome::Unchanged(target));
        }

        apply_blocking(Arc::clone(&self.actuator), target, ModeOrigin::Auto).await?;
        *self.last_applied.lock().unwrap_or_else(PoisonError::into_inner) = Some(target);
        Ok(PollOutcome::Applied(target))
    }
}

fn log_decision(verbose: bool, decision: &str) {
    if verbose {
        tracing::info!("process watcher: {decision}");
    } else {
        tracing::debug!("process watcher: {decision}");
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    first_delay: Duration,
    poll_interval: Duration,
    error_backoff: Duration,
) {
    let mut delay = first_delay;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = match shared.poll_once().await {
            Ok(_) => poll_interval,
            Err(e) => {
                tracing::warn!(error = %e, backoff = ?error_backoff, "process watcher cycle failed");
                error_backoff
            }
        };
    }
}
