//! Transport and connector contracts.
//!
//! A [`Transport`] owns one network link to the server. It sends a command
//! and yields either a result set or the server's error packet; failures of
//! the link itself surface as [`TransportError`]. Independently of any
//! command in flight, a transport reports an unexpected link drop through
//! its [`LinkMonitor`], which sessions and the pool observe via
//! [`LinkWatch`].
//!
//! Wire encoding, handshake and authentication live behind these traits.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::Config;
use crate::params::{NO_PARAMS, Params};
use crate::row::ResultSet;

/// Protocol used to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Text protocol.
    Query,
    /// Prepared statement (binary protocol).
    Execute,
    /// Liveness probe.
    Ping,
}

/// A command handed to a transport.
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    /// Protocol to use.
    pub kind: CommandKind,
    /// SQL text; empty for [`CommandKind::Ping`].
    pub sql: &'a str,
    /// Bound parameters.
    pub params: &'a Params,
}

impl<'a> Command<'a> {
    /// Text-protocol command.
    #[must_use]
    pub fn query(sql: &'a str, params: &'a Params) -> Self {
        Self {
            kind: CommandKind::Query,
            sql,
            params,
        }
    }

    /// Prepared-statement command.
    #[must_use]
    pub fn execute(sql: &'a str, params: &'a Params) -> Self {
        Self {
            kind: CommandKind::Execute,
            sql,
            params,
        }
    }

    /// Liveness probe.
    #[must_use]
    pub fn ping() -> Self {
        Self {
            kind: CommandKind::Ping,
            sql: "",
            params: &NO_PARAMS,
        }
    }
}

/// An error packet sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Server errno.
    pub errno: u16,
    /// Five-character SQL state.
    pub sql_state: String,
    /// Server message.
    pub message: String,
}

impl ServerError {
    /// Create an error packet.
    pub fn new(errno: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errno,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a command that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The command succeeded.
    Rows(ResultSet),
    /// The server rejected the command.
    Error(ServerError),
}

/// Failure of the link itself.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Connection reset by peer.
    #[error("connection reset by peer")]
    Reset,

    /// The peer closed the link while a command was expected to complete.
    #[error("socket has unexpectedly been closed")]
    UnexpectedClose,

    /// The link was already closed when the command was written.
    #[error("write after the socket was closed")]
    WriteAfterClose,

    /// Other I/O failure.
    #[error("socket error: {0}")]
    Io(Arc<io::Error>),

    /// Handshake or authentication could not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Self::Reset,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted => {
                Self::UnexpectedClose
            }
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => Self::WriteAfterClose,
            _ => Self::Io(Arc::new(err)),
        }
    }
}

/// One open link to the server.
#[async_trait]
pub trait Transport: Send {
    /// Server-assigned thread id of this link.
    fn thread_id(&self) -> u32;

    /// Send a command and wait for its outcome.
    async fn send(&mut self, command: Command<'_>) -> Result<Reply, TransportError>;

    /// Close the link. Must be idempotent.
    async fn close(&mut self);

    /// Subscribe to unexpected link drops.
    fn link(&self) -> LinkWatch;
}

/// Why a connection attempt failed.
#[derive(Debug, Clone)]
pub enum ConnectError {
    /// The server answered the handshake with an error packet.
    Rejected(ServerError),
    /// The link could not be established.
    Transport(TransportError),
}

impl From<TransportError> for ConnectError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a link and complete the handshake.
    async fn connect(&self, config: &Config) -> Result<Box<dyn Transport>, ConnectError>;
}

/// Producer side of a link-drop notification, owned by a transport.
#[derive(Debug)]
pub struct LinkMonitor {
    tx: watch::Sender<Option<String>>,
}

impl LinkMonitor {
    /// Create a monitor for a healthy link.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Report that the link dropped. Only the first reason is kept.
    pub fn dropped(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    /// Subscribe to this link.
    #[must_use]
    pub fn watch(&self) -> LinkWatch {
        LinkWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of a link-drop notification.
#[derive(Debug, Clone)]
pub struct LinkWatch {
    rx: watch::Receiver<Option<String>>,
}

impl LinkWatch {
    /// Whether the link has been reported dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The reported reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Wait until the link drops. Returns `None` once the transport is gone
    /// without having reported a drop.
    pub async fn dropped(&mut self) -> Option<String> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        }
    }
}
