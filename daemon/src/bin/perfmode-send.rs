//! Standalone client: `perfmode-send turbo|performance|silent`.
//!
//! Asks a running perfmode-daemon to switch modes and prints its reply.

use std::process::ExitCode;

use perfmode_daemon::config::{self, Config};
use perfmode_daemon::mode::Mode;
use perfmode_daemon::paths;
use perfmode_daemon::protocol::Response;
use perfmode_daemon::startup;

/// The standalone tool waits a little longer than the daemon's own hand-off.
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

#[tokio::main]
async fn main() -> ExitCode {
    perfmode_daemon::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [token] = args.as_slice() else {
        println!("Usage: perfmode-send <mode>");
        println!("Modes: turbo, performance, silent");
        return ExitCode::from(2);
    };

    let mode: Mode = match token.parse() {
        Ok(mode) => mode,
        Err(_) => {
            println!("Invalid mode. Use: turbo, performance, or silent");
            return ExitCode::from(2);
        }
    };

    let client = startup::local_client(&user_config()).with_connect_timeout(CONNECT_TIMEOUT);
    match client.request(mode).await {
        Ok(Response::Ok) => {
            println!("Successfully sent mode command '{mode}'");
            ExitCode::SUCCESS
        }
        Ok(other) => {
            println!("Daemon responded with: {other}");
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("Failed to send command ({e}). Make sure perfmode-daemon is running.");
            ExitCode::FAILURE
        }
    }
}

/// The user's config file, for the port and timeouts; defaults if unreadable.
fn user_config() -> Config {
    paths::app_data_dir()
        .and_then(|dir| config::load_or_default(&paths::config_file_path(&dir)))
        .unwrap_or_default()
}
