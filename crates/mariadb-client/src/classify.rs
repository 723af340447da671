//! Error classification.
//!
//! Turns the three failure sources a session sees into typed [`Error`]s:
//!
//! | Source | Fatal | errno / SQL state |
//! |--------|-------|-------------------|
//! | Server error packet | only when the server revoked the session | server values |
//! | Transport failure | always | 45009 / 45013 / 45019, `08S01` |
//! | Local parameter validation | never | 1210, `HY000` |

use std::time::Duration;

use crate::error::{Error, ErrorCode, ErrorKind, SQL_STATE_COMMUNICATION, SQL_STATE_GENERAL};
use crate::params::{Params, count_placeholders};
use crate::transport::{ConnectError, ServerError, TransportError};

/// Message for commands issued on a session that is no longer usable.
pub const CLOSED_SESSION_MESSAGE: &str = "Cannot execute new commands: connection closed";

/// Message for a link that dropped without the client asking.
pub const UNEXPECTED_CLOSE_MESSAGE: &str = "socket has unexpectedly been closed";

/// Whether a server error packet means the session itself is gone.
///
/// Connection killed (1927), server shutdown (1053), and any `08xxx`
/// connection-exception state are fatal. A killed *query* (1317) is not.
#[must_use]
pub fn is_fatal_server_error(errno: u16, sql_state: &str) -> bool {
    matches!(errno, 1927 | 1053) || sql_state.starts_with("08")
}

/// Classify an error packet received in reply to a command.
#[must_use]
pub fn server_error(err: &ServerError) -> Error {
    Error::server(
        err.errno,
        err.sql_state.clone(),
        err.message.clone(),
        is_fatal_server_error(err.errno, &err.sql_state),
    )
}

/// Classify a failure of the link. Always fatal.
#[must_use]
pub fn transport_error(err: &TransportError) -> Error {
    let (code, description) = match err {
        TransportError::Reset | TransportError::UnexpectedClose => {
            (ErrorCode::SocketUnexpectedClose, UNEXPECTED_CLOSE_MESSAGE.to_string())
        }
        TransportError::WriteAfterClose => {
            (ErrorCode::CmdConnectionClosed, CLOSED_SESSION_MESSAGE.to_string())
        }
        TransportError::Io(_) | TransportError::Handshake(_) => (ErrorCode::Socket, err.to_string()),
    };
    Error::new(ErrorKind::Transport, code, description)
        .with_sql_state(SQL_STATE_COMMUNICATION)
        .fatal(true)
}

/// Error for a command issued on a closed or ending session.
#[must_use]
pub fn closed_session() -> Error {
    Error::new(
        ErrorKind::Transport,
        ErrorCode::CmdConnectionClosed,
        CLOSED_SESSION_MESSAGE,
    )
    .with_sql_state(SQL_STATE_COMMUNICATION)
    .fatal(true)
}

/// Classify a failed connection attempt. Always fatal: no session exists.
#[must_use]
pub fn connect_error(err: &ConnectError) -> Error {
    match err {
        ConnectError::Rejected(packet) => server_error(packet).fatal(true),
        ConnectError::Transport(err) => transport_error(err),
    }
}

/// Error for a handshake that did not finish in time.
#[must_use]
pub fn connect_timeout(timeout: Duration) -> Error {
    Error::new(
        ErrorKind::Transport,
        ErrorCode::ConnectionTimeout,
        format!(
            "Connection timeout: failed to create socket after {}ms",
            timeout.as_millis()
        ),
    )
    .with_sql_state(SQL_STATE_COMMUNICATION)
    .fatal(true)
}

/// Check that every placeholder in `sql` has a bound value.
///
/// Reports the first 1-based position that is either beyond the end of
/// `params` ("is not set") or explicitly unset ("is undefined"). Values
/// beyond the placeholder count are accepted.
pub fn validate_params(sql: &str, params: &Params) -> Result<(), Error> {
    let Some((position, unset)) = params.first_missing(count_placeholders(sql)) else {
        return Ok(());
    };
    let reason = if unset { "is undefined" } else { "is not set" };
    Err(Error::new(
        ErrorKind::Validation,
        ErrorCode::WrongArguments,
        format!("Parameter at position {position} {reason}"),
    )
    .with_sql_state(SQL_STATE_GENERAL)
    .with_command(sql, params))
}
