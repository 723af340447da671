//! Scripted in-memory MariaDB server.
//!
//! [`MockServer`] implements [`Connector`] and hands out [`MockTransport`]s
//! that answer commands from a table of canned [`MockResponse`]s. It keeps
//! enough per-connection state to behave like a real server where the
//! session and pool logic can observe it:
//!
//! - transaction status flags follow `START TRANSACTION` / `COMMIT` /
//!   `ROLLBACK`;
//! - `KILL CONNECTION_ID()` answers with errno 1927 and drops the link;
//! - links can be dropped from the outside, pings can be made to fail and
//!   connection attempts can be rejected or delayed;
//! - every command is journaled with the thread id that ran it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mariadb_testing::mock_server::{MockResponse, MockServer};
//!
//! let server = MockServer::builder()
//!     .with_response("SELECT 1", MockResponse::scalar_int(1))
//!     .build();
//! let mut session = Session::connect(&server, &Config::default()).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mariadb_client::{
    Column, Command, CommandKind, Config, ConnectError, Connector, LinkMonitor, LinkWatch, Params,
    Reply, ResultSet, ServerError, ServerStatus, SqlValue, Transport, TransportError,
};
use parking_lot::Mutex;

/// Reason reported when the server drops a link.
pub const LINK_DROPPED: &str = "socket has unexpectedly been closed";

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return rows.
    Rows {
        /// Column definitions.
        columns: Vec<Column>,
        /// Row data.
        rows: Vec<Vec<SqlValue>>,
    },

    /// Return an affected-rows count (statements without a result set).
    Affected(u64),

    /// Return an error packet.
    Error {
        /// Server errno.
        errno: u16,
        /// SQL state.
        sql_state: String,
        /// Message.
        message: String,
    },

    /// Kill the connection: answer with errno 1927 and drop the link.
    Kill,

    /// Drop the link while the command is in flight.
    DropLink,

    /// Wait, then answer with the inner response.
    Delayed(Duration, Box<MockResponse>),

    /// Compute the response from the command.
    Custom(Arc<dyn Fn(&str, &Params) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::Affected(n) => f.debug_tuple("Affected").field(n).finish(),
            Self::Error {
                errno,
                sql_state,
                message,
            } => f
                .debug_struct("Error")
                .field("errno", errno)
                .field("sql_state", sql_state)
                .field("message", message)
                .finish(),
            Self::Kill => f.write_str("Kill"),
            Self::DropLink => f.write_str("DropLink"),
            Self::Delayed(delay, inner) => {
                f.debug_tuple("Delayed").field(delay).field(inner).finish()
            }
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// A single `BIGINT` value in a column named after it.
    pub fn scalar_int(value: i64) -> Self {
        Self::Rows {
            columns: vec![Column::new(value.to_string(), "BIGINT").with_nullable(false)],
            rows: vec![vec![SqlValue::BigInt(value)]],
        }
    }

    /// A single string value.
    pub fn scalar_string(value: impl Into<String>) -> Self {
        let value = value.into();
        Self::Rows {
            columns: vec![Column::new(value.clone(), "VARCHAR")],
            rows: vec![vec![SqlValue::String(value)]],
        }
    }

    /// Multiple rows.
    pub fn rows(columns: Vec<Column>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// An affected-rows count.
    pub fn affected(count: u64) -> Self {
        Self::Affected(count)
    }

    /// An error packet.
    pub fn error(errno: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            errno,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }

    /// Delay this response.
    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }

    /// A response computed per command.
    pub fn custom(f: impl Fn(&str, &Params) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

/// One command seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Thread id of the connection that ran it.
    pub thread_id: u32,
    /// Protocol used.
    pub kind: CommandKind,
    /// SQL text (`""` for pings).
    pub sql: String,
}

struct Connection {
    monitor: Arc<LinkMonitor>,
    in_transaction: bool,
}

struct ServerInner {
    responses: Mutex<HashMap<String, MockResponse>>,
    default_response: MockResponse,
    connections: Mutex<HashMap<u32, Connection>>,
    journal: Mutex<Vec<JournalEntry>>,
    next_thread_id: AtomicU32,
    connects: AtomicUsize,
    reject_connects: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
    fail_pings: AtomicBool,
    ping_delay: Mutex<Option<Duration>>,
}

/// Builder for [`MockServer`].
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    responses: HashMap<String, MockResponse>,
    default_response: Option<MockResponse>,
}

impl MockServerBuilder {
    /// Create a builder with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` (exact text) with `response`.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(sql.into(), response);
        self
    }

    /// Answer unknown SQL with `response` instead of `Affected(0)`.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Build the server.
    pub fn build(self) -> MockServer {
        MockServer {
            inner: Arc::new(ServerInner {
                responses: Mutex::new(self.responses),
                default_response: self.default_response.unwrap_or(MockResponse::Affected(0)),
                connections: Mutex::new(HashMap::new()),
                journal: Mutex::new(Vec::new()),
                next_thread_id: AtomicU32::new(1),
                connects: AtomicUsize::new(0),
                reject_connects: AtomicUsize::new(0),
                connect_delay: Mutex::new(None),
                fail_pings: AtomicBool::new(false),
                ping_delay: Mutex::new(None),
            }),
        }
    }
}

/// In-memory server. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockServer {
    inner: Arc<ServerInner>,
}

impl Default for MockServer {
    fn default() -> Self {
        MockServerBuilder::new().build()
    }
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServer")
            .field("open_connections", &self.open_connections())
            .field("connects", &self.connect_count())
            .finish_non_exhaustive()
    }
}

impl MockServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Add or replace a canned response.
    pub fn set_response(&self, sql: impl Into<String>, response: MockResponse) {
        self.inner.responses.lock().insert(sql.into(), response);
    }

    /// Reject the next `count` connection attempts with access denied.
    pub fn reject_next_connects(&self, count: usize) {
        self.inner.reject_connects.store(count, Ordering::SeqCst);
    }

    /// Delay every connection attempt.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.inner.connect_delay.lock() = delay;
    }

    /// Make pings drop the link instead of succeeding.
    pub fn fail_pings(&self, fail: bool) {
        self.inner.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// Delay every ping answer, as a stalled link would.
    pub fn set_ping_delay(&self, delay: Option<Duration>) {
        *self.inner.ping_delay.lock() = delay;
    }

    /// Drop the link of one connection, as a network failure or a `KILL`
    /// from another session would.
    pub fn drop_link(&self, thread_id: u32) {
        if let Some(conn) = self.inner.connections.lock().get(&thread_id) {
            conn.monitor.dropped(LINK_DROPPED);
        }
    }

    /// Drop every open link.
    pub fn drop_all_links(&self) {
        for conn in self.inner.connections.lock().values() {
            conn.monitor.dropped(LINK_DROPPED);
        }
    }

    /// Number of successful connection attempts so far.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of links currently open.
    pub fn open_connections(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Thread ids of the open links, ascending.
    pub fn open_thread_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.inner.connections.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Every command seen so far.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.inner.journal.lock().clone()
    }

    /// SQL run by one connection, in order. Pings are omitted.
    pub fn statements(&self, thread_id: u32) -> Vec<String> {
        self.inner
            .journal
            .lock()
            .iter()
            .filter(|e| e.thread_id == thread_id && e.kind != CommandKind::Ping)
            .map(|e| e.sql.clone())
            .collect()
    }

    /// How many times `sql` was run, on any connection.
    pub fn count(&self, sql: &str) -> usize {
        self.inner
            .journal
            .lock()
            .iter()
            .filter(|e| e.kind != CommandKind::Ping && e.sql == sql)
            .count()
    }

    /// How many pings were received.
    pub fn ping_count(&self) -> usize {
        self.inner
            .journal
            .lock()
            .iter()
            .filter(|e| e.kind == CommandKind::Ping)
            .count()
    }

    /// Forget the journal.
    pub fn clear_journal(&self) {
        self.inner.journal.lock().clear();
    }

    fn is_dropped(&self, thread_id: u32) -> bool {
        self.inner
            .connections
            .lock()
            .get(&thread_id)
            .is_none_or(|conn| conn.monitor.watch().is_dropped())
    }

    fn response_for(&self, sql: &str) -> MockResponse {
        let canned = self.inner.responses.lock().get(sql).cloned();
        match canned {
            Some(response) => response,
            None if sql.eq_ignore_ascii_case("KILL CONNECTION_ID()") => MockResponse::Kill,
            None => self.inner.default_response.clone(),
        }
    }

    fn status(&self, thread_id: u32, sql: &str) -> ServerStatus {
        let mut connections = self.inner.connections.lock();
        let Some(conn) = connections.get_mut(&thread_id) else {
            return ServerStatus(ServerStatus::AUTOCOMMIT);
        };
        let statement = sql.trim();
        if statement.eq_ignore_ascii_case("START TRANSACTION")
            || statement.eq_ignore_ascii_case("BEGIN")
        {
            conn.in_transaction = true;
        } else if statement.eq_ignore_ascii_case("COMMIT")
            || statement.eq_ignore_ascii_case("ROLLBACK")
        {
            conn.in_transaction = false;
        }
        let mut flags = ServerStatus::AUTOCOMMIT;
        if conn.in_transaction {
            flags |= ServerStatus::IN_TRANS;
        }
        ServerStatus(flags)
    }

    fn forget(&self, thread_id: u32) {
        self.inner.connections.lock().remove(&thread_id);
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(&self, _config: &Config) -> Result<Box<dyn Transport>, ConnectError> {
        let delay = *self.inner.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rejected = self
            .inner
            .reject_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(ConnectError::Rejected(ServerError::new(
                1045,
                "28000",
                "Access denied for user 'root'@'localhost'",
            )));
        }

        let thread_id = self.inner.next_thread_id.fetch_add(1, Ordering::SeqCst);
        let monitor = Arc::new(LinkMonitor::new());
        self.inner.connections.lock().insert(
            thread_id,
            Connection {
                monitor: Arc::clone(&monitor),
                in_transaction: false,
            },
        );
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(thread_id, "mock connection opened");
        Ok(Box::new(MockTransport {
            thread_id,
            server: self.clone(),
            monitor,
            closed: false,
        }))
    }
}

/// One link to a [`MockServer`].
pub struct MockTransport {
    thread_id: u32,
    server: MockServer,
    monitor: Arc<LinkMonitor>,
    closed: bool,
}

impl MockTransport {
    fn drop_link(&self) {
        self.monitor.dropped(LINK_DROPPED);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn thread_id(&self) -> u32 {
        self.thread_id
    }

    async fn send(&mut self, command: Command<'_>) -> Result<Reply, TransportError> {
        if self.closed {
            return Err(TransportError::WriteAfterClose);
        }
        if self.server.is_dropped(self.thread_id) {
            return Err(TransportError::UnexpectedClose);
        }
        self.server.inner.journal.lock().push(JournalEntry {
            thread_id: self.thread_id,
            kind: command.kind,
            sql: command.sql.to_string(),
        });

        if command.kind == CommandKind::Ping {
            let delay = *self.server.inner.ping_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.server.inner.fail_pings.load(Ordering::SeqCst) {
                self.drop_link();
                return Err(TransportError::UnexpectedClose);
            }
            return Ok(Reply::Rows(ResultSet::affected(0)));
        }

        let mut response = self.server.response_for(command.sql);
        let response = loop {
            match response {
                MockResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    if self.server.is_dropped(self.thread_id) {
                        return Err(TransportError::UnexpectedClose);
                    }
                    response = *inner;
                }
                MockResponse::Custom(f) => response = f(command.sql, command.params),
                other => break other,
            }
        };

        match response {
            MockResponse::Rows { columns, rows } => {
                let status = self.server.status(self.thread_id, command.sql);
                Ok(Reply::Rows(ResultSet::rows(columns, rows).with_status(status)))
            }
            MockResponse::Affected(count) => {
                let status = self.server.status(self.thread_id, command.sql);
                Ok(Reply::Rows(ResultSet::affected(count).with_status(status)))
            }
            MockResponse::Error {
                errno,
                sql_state,
                message,
            } => Ok(Reply::Error(ServerError::new(errno, sql_state, message))),
            MockResponse::Kill => {
                self.drop_link();
                Ok(Reply::Error(ServerError::new(
                    1927,
                    "70100",
                    "Connection was killed",
                )))
            }
            MockResponse::DropLink => {
                self.drop_link();
                Err(TransportError::UnexpectedClose)
            }
            MockResponse::Delayed(..) | MockResponse::Custom(_) => {
                Ok(Reply::Rows(ResultSet::default()))
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.server.forget(self.thread_id);
            tracing::trace!(thread_id = self.thread_id, "mock connection closed");
        }
    }

    fn link(&self) -> LinkWatch {
        self.monitor.watch()
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.server.forget(self.thread_id);
    }
}
