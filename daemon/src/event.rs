use crate::config::Config;

pub enum DaemonEvent {
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; stop the watcher and the command server, then exit.
    Shutdown,
}
