//! Client error types.
//!
//! Every failure surfaced by the client, whatever its origin, is an
//! [`Error`]: a server error packet, a broken transport, a parameter list
//! rejected before anything was sent, or a pool lifecycle condition. The
//! error carries the server-compatible `errno`/`sql_state` pair, a stable
//! [`ErrorCode`] symbol, and an explicit `fatal` flag telling the caller
//! whether the session that produced it is gone.

use std::fmt;

use thiserror::Error;

/// SQL state used for library-internal conditions.
pub const SQL_STATE_GENERAL: &str = "HY000";

/// SQL state used for communication link failures.
pub const SQL_STATE_COMMUNICATION: &str = "08S01";

/// Origin of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The server answered a command with an error packet.
    Server,
    /// The link to the server failed or was already gone.
    Transport,
    /// The command was rejected locally before any bytes were sent.
    Validation,
    /// The pool refused the request (closed, or acquisition timed out).
    Pool,
    /// Invalid client or pool configuration.
    Config,
}

/// Stable error code symbols.
///
/// Server codes keep the server's errno; library codes live in the 45000
/// range the server never uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// `ER_CON_COUNT_ERROR` (1040).
    ConCountError,
    /// `ER_ACCESS_DENIED_ERROR` (1045).
    AccessDenied,
    /// `ER_SERVER_SHUTDOWN` (1053).
    ServerShutdown,
    /// `ER_DUP_ENTRY` (1062).
    DupEntry,
    /// `ER_PARSE_ERROR` (1064).
    ParseError,
    /// `ER_NO_SUCH_TABLE` (1146).
    NoSuchTable,
    /// `ER_LOCK_WAIT_TIMEOUT` (1205).
    LockWaitTimeout,
    /// `ER_WRONG_ARGUMENTS` (1210), also used for local parameter validation.
    WrongArguments,
    /// `ER_LOCK_DEADLOCK` (1213).
    LockDeadlock,
    /// `ER_QUERY_INTERRUPTED` (1317).
    QueryInterrupted,
    /// `ER_CONNECTION_KILLED` (1927).
    ConnectionKilled,
    /// `ER_CONNECTION_ALREADY_CLOSED` (45001).
    ConnectionAlreadyClosed,
    /// `ER_SOCKET_UNEXPECTED_CLOSE` (45009).
    SocketUnexpectedClose,
    /// `ER_CONNECTION_TIMEOUT` (45012).
    ConnectionTimeout,
    /// `ER_CMD_CONNECTION_CLOSED` (45013).
    CmdConnectionClosed,
    /// `ER_SOCKET` (45019).
    Socket,
    /// `ER_POOL_ALREADY_CLOSED` (45027).
    PoolAlreadyClosed,
    /// `ER_GET_CONNECTION_TIMEOUT` (45028).
    GetConnectionTimeout,
    /// `ER_CONFIGURATION` (45050).
    Configuration,
    /// Server errno without a known symbol.
    Unknown,
}

impl ErrorCode {
    /// Map a server errno to its symbol.
    #[must_use]
    pub fn from_errno(errno: u16) -> Self {
        match errno {
            1040 => Self::ConCountError,
            1045 => Self::AccessDenied,
            1053 => Self::ServerShutdown,
            1062 => Self::DupEntry,
            1064 => Self::ParseError,
            1146 => Self::NoSuchTable,
            1205 => Self::LockWaitTimeout,
            1210 => Self::WrongArguments,
            1213 => Self::LockDeadlock,
            1317 => Self::QueryInterrupted,
            1927 => Self::ConnectionKilled,
            45001 => Self::ConnectionAlreadyClosed,
            45009 => Self::SocketUnexpectedClose,
            45012 => Self::ConnectionTimeout,
            45013 => Self::CmdConnectionClosed,
            45019 => Self::Socket,
            45027 => Self::PoolAlreadyClosed,
            45028 => Self::GetConnectionTimeout,
            45050 => Self::Configuration,
            _ => Self::Unknown,
        }
    }

    /// The errno this code stands for, `None` for [`ErrorCode::Unknown`].
    #[must_use]
    pub fn errno(&self) -> Option<u16> {
        let errno = match self {
            Self::ConCountError => 1040,
            Self::AccessDenied => 1045,
            Self::ServerShutdown => 1053,
            Self::DupEntry => 1062,
            Self::ParseError => 1064,
            Self::NoSuchTable => 1146,
            Self::LockWaitTimeout => 1205,
            Self::WrongArguments => 1210,
            Self::LockDeadlock => 1213,
            Self::QueryInterrupted => 1317,
            Self::ConnectionKilled => 1927,
            Self::ConnectionAlreadyClosed => 45001,
            Self::SocketUnexpectedClose => 45009,
            Self::ConnectionTimeout => 45012,
            Self::CmdConnectionClosed => 45013,
            Self::Socket => 45019,
            Self::PoolAlreadyClosed => 45027,
            Self::GetConnectionTimeout => 45028,
            Self::Configuration => 45050,
            Self::Unknown => return None,
        };
        Some(errno)
    }

    /// The stable symbol, e.g. `ER_POOL_ALREADY_CLOSED`.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::ConCountError => "ER_CON_COUNT_ERROR",
            Self::AccessDenied => "ER_ACCESS_DENIED_ERROR",
            Self::ServerShutdown => "ER_SERVER_SHUTDOWN",
            Self::DupEntry => "ER_DUP_ENTRY",
            Self::ParseError => "ER_PARSE_ERROR",
            Self::NoSuchTable => "ER_NO_SUCH_TABLE",
            Self::LockWaitTimeout => "ER_LOCK_WAIT_TIMEOUT",
            Self::WrongArguments => "ER_WRONG_ARGUMENTS",
            Self::LockDeadlock => "ER_LOCK_DEADLOCK",
            Self::QueryInterrupted => "ER_QUERY_INTERRUPTED",
            Self::ConnectionKilled => "ER_CONNECTION_KILLED",
            Self::ConnectionAlreadyClosed => "ER_CONNECTION_ALREADY_CLOSED",
            Self::SocketUnexpectedClose => "ER_SOCKET_UNEXPECTED_CLOSE",
            Self::ConnectionTimeout => "ER_CONNECTION_TIMEOUT",
            Self::CmdConnectionClosed => "ER_CMD_CONNECTION_CLOSED",
            Self::Socket => "ER_SOCKET",
            Self::PoolAlreadyClosed => "ER_POOL_ALREADY_CLOSED",
            Self::GetConnectionTimeout => "ER_GET_CONNECTION_TIMEOUT",
            Self::Configuration => "ER_CONFIGURATION",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The command an error belongs to: SQL text and rendered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    sql: String,
    params: String,
}

impl CommandContext {
    /// Create a context from SQL text and an already rendered parameter list.
    pub fn new(sql: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: params.into(),
        }
    }

    /// The SQL text of the failing command.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The rendered parameter list, without the surrounding brackets.
    #[must_use]
    pub fn params(&self) -> &str {
        &self.params
    }
}

fn context_suffix(context: &Option<CommandContext>) -> String {
    match context {
        Some(ctx) => format!("\nsql: {} - parameters:[{}]", ctx.sql, ctx.params),
        None => String::new(),
    }
}

/// Errors that can occur during client and pool operations.
///
/// The message renders as `<description>` or, once the failing command is
/// known, `<description>\nsql: <sql> - parameters:[<values>]`.
#[derive(Debug, Clone, Error)]
#[error("{description}{}", context_suffix(.context))]
pub struct Error {
    kind: ErrorKind,
    code: ErrorCode,
    errno: u16,
    sql_state: String,
    fatal: bool,
    description: String,
    context: Option<CommandContext>,
}

impl Error {
    /// Create a library error with SQL state `HY000` and the errno of `code`.
    ///
    /// The error is non-fatal; use [`Error::fatal`] to change that.
    pub fn new(kind: ErrorKind, code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            errno: code.errno().unwrap_or(0),
            sql_state: SQL_STATE_GENERAL.to_string(),
            fatal: false,
            description: description.into(),
            context: None,
        }
    }

    /// Create an error from the fields of a server error packet.
    pub fn server(
        errno: u16,
        sql_state: impl Into<String>,
        message: impl Into<String>,
        fatal: bool,
    ) -> Self {
        Self {
            kind: ErrorKind::Server,
            code: ErrorCode::from_errno(errno),
            errno,
            sql_state: sql_state.into(),
            fatal,
            description: message.into(),
            context: None,
        }
    }

    /// Create a configuration error.
    pub fn config(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, ErrorCode::Configuration, description)
    }

    /// Set the fatal flag.
    #[must_use]
    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    /// Override the SQL state.
    #[must_use]
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = sql_state.into();
        self
    }

    /// Attach the failing command. An already attached command is kept.
    #[must_use]
    pub fn with_command(mut self, sql: &str, params: &crate::params::Params) -> Self {
        if self.context.is_none() {
            self.context = Some(CommandContext::new(sql, params.render()));
        }
        self
    }

    /// The origin of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable code symbol.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Server errno, or the library errno for internal conditions.
    #[must_use]
    pub fn errno(&self) -> u16 {
        self.errno
    }

    /// Five-character SQL state.
    #[must_use]
    pub fn sql_state(&self) -> &str {
        &self.sql_state
    }

    /// Whether the session that produced this error can no longer be used.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// The message without the command context.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The failing command, if known.
    #[must_use]
    pub fn context(&self) -> Option<&CommandContext> {
        self.context.as_ref()
    }

    /// Check if this is a server error with a specific errno.
    #[must_use]
    pub fn is_server_error(&self, errno: u16) -> bool {
        self.kind == ErrorKind::Server && self.errno == errno
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors include acquisition timeouts, deadlocks, lock wait
    /// timeouts and broken links (on a fresh session).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::GetConnectionTimeout
                | ErrorCode::ConnectionTimeout
                | ErrorCode::LockDeadlock
                | ErrorCode::LockWaitTimeout
                | ErrorCode::ConCountError
        ) || self.kind == ErrorKind::Transport
    }
}

impl From<mariadb_types::TypeError> for Error {
    fn from(err: mariadb_types::TypeError) -> Self {
        Self::new(ErrorKind::Validation, ErrorCode::WrongArguments, err.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::Params;

    #[test]
    fn test_display_without_context() {
        let err = Error::new(ErrorKind::Pool, ErrorCode::PoolAlreadyClosed, "pool is closed");
        assert_eq!(err.to_string(), "pool is closed");
        assert_eq!(err.errno(), 45027);
        assert_eq!(err.sql_state(), "HY000");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display_with_context() {
        let err = Error::server(1064, "42000", "You have an error in your SQL syntax", false)
            .with_command("wrong query", &Params::new());
        assert_eq!(
            err.to_string(),
            "You have an error in your SQL syntax\nsql: wrong query - parameters:[]"
        );
        assert_eq!(err.code(), ErrorCode::ParseError);
        assert_eq!(err.code().symbol(), "ER_PARSE_ERROR");
    }

    #[test]
    fn test_first_context_wins() {
        let err = Error::server(1146, "42S02", "Table 't' doesn't exist", false)
            .with_command("SELECT 1", &Params::new())
            .with_command("SELECT 2", &Params::new());
        assert_eq!(err.context().unwrap().sql(), "SELECT 1");
    }

    #[test]
    fn test_errno_symbol_round_trip() {
        for errno in [1040, 1064, 1210, 1927, 45013, 45027, 45028] {
            assert_eq!(ErrorCode::from_errno(errno).errno(), Some(errno));
        }
        assert_eq!(ErrorCode::from_errno(9999), ErrorCode::Unknown);
        assert_eq!(ErrorCode::Unknown.errno(), None);
    }

    #[test]
    fn test_server_error_keeps_unknown_errno() {
        let err = Error::server(4242, "HY000", "odd", false);
        assert_eq!(err.errno(), 4242);
        assert_eq!(err.code(), ErrorCode::Unknown);
        assert!(err.is_server_error(4242));
    }

    #[test]
    fn test_transient_classification() {
        let deadlock = Error::server(1213, "40001", "Deadlock found", false);
        assert!(deadlock.is_transient());
        let syntax = Error::server(1064, "42000", "syntax", false);
        assert!(!syntax.is_transient());
    }
}
