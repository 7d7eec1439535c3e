/// Command Client: hands a mode change to an already running instance.
///
/// "Nobody is listening" is the normal case when the daemon is launched for
/// the first time, so [`CommandClient::send_mode`] reports it as plain `false`.
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::error::ClientError;
use crate::mode::Mode;
use crate::protocol::{request_line, Response};

/// Upper bound on waiting for the server's reply once connected.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CommandClient {
    addr: SocketAddr,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl CommandClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Client for `127.0.0.1:<port>`.
    pub fn local(port: u16) -> Self {
        Self::new((Ipv4Addr::LOCALHOST, port).into())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sends `mode` and returns true iff the server answered exactly `OK`.
    pub async fn send_mode(&self, mode: Mode) -> bool {
        match self.request(mode).await {
            Ok(response) => response.is_ok(),
            Err(e) => {
                tracing::debug!(addr = %self.addr, error = %e, "mode command not delivered");
                false
            }
        }
    }

    /// Performs one request/response exchange.
    pub async fn request(&self, mode: Mode) -> Result<Response, ClientError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| ClientError::Timeout(self.connect_timeout))??;

        tokio::time::timeout(self.response_timeout, exchange(stream, mode))
            .await
            .map_err(|_| ClientError::Timeout(self.response_timeout))?
    }
}

async fn exchange(stream: TcpStream, mode: Mode) -> Result<Response, ClientError> {
    let (reader, mut writer) = stream.into_split();
    writer
        .write_all(format!("{}\n", request_line(mode)).as_bytes())
        .await?;
    writer.flush().await?;

    let mut line = String::new();
    if BufReader::new(reader).read_line(&mut line).await? == 0 {
        return Err(ClientError::Closed);
    }
    Response::parse(&line).ok_or_else(|| ClientError::Malformed(line.trim_end().to_string()))
}
