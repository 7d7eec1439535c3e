//! Local performance-mode control plane.
//!
//! Two pieces share one apply-mode boundary ([`actuator::ModeActuator`]):
//! a loopback command server/client pair for explicit mode changes, and a
//! background arbiter that picks a mode from the running process list.

pub mod actuator;
pub mod arbiter;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod mode;
pub mod paths;
pub mod pattern;
pub mod process_monitor;
pub mod protocol;
pub mod server;
pub mod startup;
pub mod status;

#[cfg(test)]
mod test_support;

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
