/// Loopback command server.
///
/// Any local process may connect and change the mode; there is no
/// authentication beyond the loopback-only bind. Treat the port as a local
/// trust boundary.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::actuator::{apply_blocking, ModeActuator};
use crate::config::DEFAULT_READ_TIMEOUT_MS;
use crate::error::IpcError;
use crate::mode::ModeOrigin;
use crate::protocol::{parse_request, Response};

/// Requests are short; anything longer is not a mode command.
const MAX_REQUEST_BYTES: u64 = 256;

pub struct CommandServer {
    listener: TcpListener,
    read_timeout: Duration,
}

impl CommandServer {
    /// Binds `addr`, which must be a loopback address. Fails if the port is
    /// already taken.
    pub async fn bind(addr: SocketAddr) -> Result<Self, IpcError> {
        if !addr.ip().is_loopback() {
            return Err(IpcError::NotLoopback(addr));
        }
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| IpcError::Bind { addr, source })?;
        Ok(Self {
            listener,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        })
    }

    /// Sets how long a connection may take to send its request line.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `cancel` fires. Each connection is handled on
    /// its own task; handlers still running at cancellation are left to finish
    /// or hit their read deadline.
    pub async fn serve(self, actuator: Arc<dyn ModeActuator>, cancel: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "command server listening");
        }

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let actuator = Arc::clone(&actuator);
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, actuator, read_timeout).await {
                            tracing::warn!(%peer, error = %e, "command connection failed");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }

        tracing::info!("command server stopped");
    }
}

/// Reads one request, applies it and writes one response line.
async fn handle_connection(
    stream: TcpStream,
    actuator: Arc<dyn ModeActuator>,
    read_timeout: Duration,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader).take(MAX_REQUEST_BYTES);
    let mut raw = Vec::new();

    match tokio::time::timeout(read_timeout, reader.read_until(b'\n', &mut raw)).await {
        Ok(read) => {
            read?;
        }
        Err(_) => {
            tracing::debug!(?read_timeout, "no request before deadline; closing");
            return Ok(());
        }
    }

    // Bytes, not a String: invalid UTF-8 still gets an answer.
    let response = match String::from_utf8(raw) {
        Ok(line) => {
            tracing::info!(command = line.trim_end(), "received IPC command");
            match parse_request(&line) {
                Ok(mode) => match apply_blocking(actuator, mode, ModeOrigin::Manual).await {
                    Ok(()) => Response::Ok,
                    Err(e) => {
                        tracing::error!(%mode, error = %e, "failed to apply requested mode");
                        Response::Error(None)
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "rejected IPC command");
                    Response::invalid_command()
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "rejected IPC command that is not UTF-8");
            Response::invalid_command()
        }
    };

    writer.write_all(format!("{response}\n").as_bytes()).await?;
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CommandClient;
    use crate::mode::Mode;
    use crate::test_support::RecordingActuator;
    use std::net::Ipv4Addr;
    use tokio::task::JoinSet;

    async fn start_server(
        read_timeout: Duration,
    ) -> (SocketAddr, Arc<RecordingActuator>, CancellationToken) {
        let server = CommandServer::bind((Ipv4Addr::LOCALHOST, 0).into())
            .await
            .unwrap()
            .with_read_timeout(read_timeout);
        let addr = server.local_addr().unwrap();
        let actuator = Arc::new(RecordingActuator::default());
        let cancel = CancellationToken::new();
        tokio::spawn(server.serve(actuator.clone(), cancel.clone()));
        (addr, actuator, cancel)
    }

    async fn exchange(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn turbo_request_applies_index_one_as_manual() {
        let (addr, actuator, cancel) = start_server(Duration::from_secs(5)).await;

        assert_eq!(exchange(addr, "mode:turbo\n").await, "OK\n");

        let calls = actuator.calls();
        assert_eq!(calls, [(Mode::Turbo, ModeOrigin::Manual)]);
        assert_eq!(calls[0].0.index(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn bogus_request_is_rejected_without_applying() {
        let (addr, actuator, cancel) = start_server(Duration::from_secs(5)).await;

        assert_eq!(exchange(addr, "mode:bogus\n").await, "ERROR: Invalid command\n");
        assert_eq!(exchange(addr, "hello\n").await, "ERROR: Invalid command\n");
        assert!(actuator.calls().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn non_utf8_request_is_rejected_with_reply() {
        let (addr, actuator, cancel) = start_server(Duration::from_secs(5)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"mode:\xff\xfe\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert_eq!(response, "ERROR: Invalid command\n");
        assert!(actuator.calls().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn padded_token_is_rejected() {
        let (addr, actuator, cancel) = start_server(Duration::from_secs(5)).await;

        assert_eq!(exchange(addr, "mode: turbo \n").await, "ERROR: Invalid command\n");
        assert!(actuator.calls().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn actuator_failure_replies_error() {
        let (addr, actuator, cancel) = start_server(Duration::from_secs(5)).await;
        actuator.set_failing(true);

        assert_eq!(exchange(addr, "mode:silent\n").await, "ERROR\n");
        cancel.cancel();
    }

    #[tokio::test]
    async fn concurrent_clients_are_all_served() {
        const CLIENTS: usize = 12;
        let (addr, actuator, cancel) = start_server(Duration::from_secs(5)).await;

        let mut set = JoinSet::new();
        for i in 0..CLIENTS {
            let mode = Mode::ALL[i % Mode::ALL.len()];
            set.spawn(async move { CommandClient::new(addr).send_mode(mode).await });
        }
        while let Some(result) = set.join_next().await {
            assert!(result.unwrap());
        }

        let calls = actuator.calls();
        assert_eq!(calls.len(), CLIENTS);
        for mode in Mode::ALL {
            assert_eq!(calls.iter().filter(|(m, _)| *m == mode).count(), CLIENTS / 3);
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn silent_client_is_dropped_after_read_deadline() {
        let (addr, actuator, cancel) = start_server(Duration::from_millis(100)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
            .await
            .expect("server should close idle connection");
        assert_eq!(read.unwrap(), 0);
        assert!(actuator.calls().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn bind_fails_when_port_is_taken() {
        let first = CommandServer::bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
        let addr = first.local_addr().unwrap();
        assert!(matches!(
            CommandServer::bind(addr).await,
            Err(IpcError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn bind_rejects_non_loopback_address() {
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
        assert!(matches!(
            CommandServer::bind(addr).await,
            Err(IpcError::NotLoopback(_))
        ));
    }

    #[tokio::test]
    async fn cancel_stops_accept_loop() {
        let server = CommandServer::bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(
            Arc::new(RecordingActuator::default()),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("accept loop should exit promptly")
            .unwrap();
    }
}
