//! # mariadb-driver-pool
//!
//! Connection pool for MariaDB and MySQL sessions.
//!
//! The pool hands out [`PooledSession`]s from a bounded set of
//! [`mariadb_client::Session`]s and queues callers when every session is in
//! use.
//!
//! ## Features
//!
//! - Strict FIFO service of waiting callers, with a per-request acquisition
//!   timeout measured from the moment the request was queued
//! - Lazy growth up to `connection_limit`, optional pre-warmed sessions
//! - Health probe before reusing a session idle for `min_delay_validation`
//! - Implicit rollback of transactions left open on release
//! - Fatal session errors update pool counts immediately and open a
//!   replacement
//! - Idle sessions whose link drops are evicted and replaced
//! - Graceful [`Pool::end`] that rejects queued callers and waits for held
//!   sessions
//!
//! ## Example
//!
//! ```rust,ignore
//! use mariadb_driver_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .connection_limit(20)
//!     .acquire_timeout(Duration::from_secs(2));
//!
//! let pool = Pool::new(connector, client_config, config).await?;
//! let mut session = pool.get().await?;
//! session.query("SELECT 1", &Params::new()).await?;
//! session.release().await?;
//! pool.end().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use lifecycle::ConnectionMetadata;
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledSession};
