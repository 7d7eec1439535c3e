//! Error types for each failure class. None of these are fatal to the daemon.

use std::net::SocketAddr;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// A request line that is not a recognized `mode:<token>` command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty request")]
    Empty,

    #[error("unrecognized command: {0:?}")]
    UnknownCommand(String),

    #[error("unknown mode {0:?} (expected turbo, performance or silent)")]
    UnknownMode(String),
}

/// The Command Client could not complete an exchange.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed before a response was received")]
    Closed,

    #[error("malformed response: {0:?}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The external apply-mode operation failed.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("actuator command is empty")]
    EmptyCommand,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },

    #[error("{program} still running after {timeout:?}; killed")]
    Timeout { program: String, timeout: Duration },

    #[error("actuator task aborted: {0}")]
    Aborted(String),
}

/// Process enumeration failed.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("process table is empty")]
    Empty,

    #[error("process scan failed: {0}")]
    Other(String),
}

/// A single arbitration cycle failed; the loop backs off and retries.
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

/// The Command Server could not be started.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("refusing to listen on non-loopback address {0}")]
    NotLoopback(SocketAddr),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bad command-line arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error(transparent)]
    Mode(#[from] ProtocolError),
}
