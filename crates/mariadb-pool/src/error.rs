//! Pool error types.
//!
//! Pool operations report failures as [`mariadb_client::Error`] so callers
//! handle one error type. [`PoolError`] names the pool's own conditions and
//! converts into it with the matching errno and code.

use std::time::Duration;

use mariadb_client::{Error, ErrorCode, ErrorKind};
use thiserror::Error;

/// Errors raised by the pool itself.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// The pool has begun or finished `end`.
    #[error("pool is closed")]
    PoolClosed,

    /// No session became available within the acquisition timeout.
    #[error(
        "retrieve connection from pool timeout after {}ms\n    (pool connections: active={active} idle={idle} limit={limit})",
        .waited.as_millis()
    )]
    AcquisitionTimeout {
        /// Time spent queued.
        waited: Duration,
        /// Sessions in use when the request gave up.
        active: u32,
        /// Idle sessions when the request gave up.
        idle: u32,
        /// Configured connection limit.
        limit: u32,
    },

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::PoolClosed => {
                Error::new(ErrorKind::Pool, ErrorCode::PoolAlreadyClosed, err.to_string())
            }
            PoolError::AcquisitionTimeout { .. } => Error::new(
                ErrorKind::Pool,
                ErrorCode::GetConnectionTimeout,
                err.to_string(),
            ),
            PoolError::Configuration(_) => Error::config(err.to_string()),
        }
    }
}
