use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use perfmode_daemon::actuator::StatusActuator;
use perfmode_daemon::arbiter::Arbiter;
use perfmode_daemon::cli::{self, USAGE};
use perfmode_daemon::config::{self, Config, SharedConfig};
use perfmode_daemon::event::DaemonEvent;
use perfmode_daemon::paths;
use perfmode_daemon::process_monitor::SysinfoProcessSource;
use perfmode_daemon::server::CommandServer;
use perfmode_daemon::startup;

#[tokio::main]
async fn main() -> ExitCode {
    perfmode_daemon::init_logging();

    // ── Arguments ─────────────────────────────────────────────────────────────
    let args = match cli::parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = match args.config_path.as_deref() {
        Some(path) => config::resolve_config_path(path),
        None => paths::app_data_dir().map(|dir| paths::config_file_path(&dir)),
    };
    let (data_dir, config_path) =
        match config_path.and_then(|path| Ok((config::config_dir(&path)?, path))) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!("cannot locate config file: {e:#}");
                return ExitCode::FAILURE;
            }
        };
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::warn!("using default config: {e:#}");
        Config::default()
    });
    let ipc = initial_config.ipc.clone();

    // ── Hand off to a running instance ────────────────────────────────────────
    if let Some(mode) = args.mode {
        if startup::hand_off(mode, &startup::local_client(&initial_config)).await {
            println!("Sent mode command '{mode}' to running instance.");
            return ExitCode::SUCCESS;
        }
        println!("No running instance found. Starting and setting mode to {mode}.");
    }

    // ── Status + actuator ─────────────────────────────────────────────────────
    let actuator = Arc::new(StatusActuator::new(
        paths::status_file_path(&data_dir),
        initial_config.actuator.clone(),
    ));
    let shared_config: SharedConfig = Arc::new(RwLock::new(initial_config));

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));

    // ── Command server ────────────────────────────────────────────────────────
    let ipc_cancel = CancellationToken::new();
    if ipc.enabled {
        match CommandServer::bind((Ipv4Addr::LOCALHOST, ipc.port).into()).await {
            Ok(server) => {
                actuator.set_ipc_listening(true);
                tokio::spawn(
                    server
                        .with_read_timeout(ipc.read_timeout())
                        .serve(actuator.clone(), ipc_cancel.clone()),
                );
            }
            Err(e) => tracing::error!(error = %e, "command server unavailable; continuing without IPC"),
        }
    }

    // ── Process watcher ───────────────────────────────────────────────────────
    let mut arbiter = Arbiter::new(
        Arc::clone(&shared_config),
        actuator.clone(),
        SysinfoProcessSource::new(),
    );
    arbiter.start().await;

    // A mode given on the command line overrides the watcher's first pick.
    if let Some(mode) = args.mode {
        if let Err(e) = startup::apply_launch_mode(actuator.clone(), mode).await {
            tracing::error!(%mode, error = %e, "failed to apply startup mode");
        }
    }

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    tracing::info!("perfmode-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            DaemonEvent::ConfigReloaded(new_config) => {
                tracing::info!("config reloaded");
                if new_config.ipc != ipc {
                    tracing::warn!("[ipc] changes take effect after restart");
                }
                actuator.set_settings(new_config.actuator.clone());
                *shared_config.write().await = new_config;
                arbiter.reload_mappings().await;
            }

            DaemonEvent::Shutdown => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    ipc_cancel.cancel();
    arbiter.stop().await;
    actuator.set_ipc_listening(false);
    ExitCode::SUCCESS
}
