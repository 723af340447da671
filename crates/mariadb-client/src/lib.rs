//! # mariadb-client
//!
//! Session lifecycle, error taxonomy and command facade for MariaDB/MySQL.
//!
//! The crate sits above a wire-protocol implementation, which it reaches
//! through the [`Transport`] and [`Connector`] traits, and below the
//! connection pool in `mariadb-driver-pool`.
//!
//! ## Features
//!
//! - **Session lifecycle**: explicit [`SessionState`] machine with implicit
//!   rollback on checkin and health probes on checkout
//! - **Typed errors**: one [`Error`] type with errno, SQL state, a stable
//!   [`ErrorCode`] symbol and an explicit `fatal` flag
//! - **Parameter validation**: placeholder/parameter mismatches are reported
//!   before anything reaches the server
//! - **Event streams**: [`QueryStream`] replays a command as
//!   `error | fields, row*` followed by exactly one `end`
//!
//! ## Error Messages
//!
//! Errors raised while running a command embed the command:
//!
//! ```text
//! Parameter at position 2 is undefined
//! sql: INSERT INTO t values (?, ?, ?) - parameters:[1,undefined,3]
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use mariadb_client::{Config, Params, Session, params};
//!
//! let config = Config::from_connection_string("Server=localhost;User=app;Password=secret")?;
//! let mut session = Session::connect(&connector, &config).await?;
//!
//! session.begin_transaction().await?;
//! session.execute("INSERT INTO users (name) VALUES (?)", &params!["Alice"]).await?;
//! session.commit().await?;
//! session.end().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod params;
pub mod row;
pub mod session;
pub mod state;
pub mod stream;
pub mod transaction;
pub mod transport;

pub use config::Config;
pub use error::{CommandContext, Error, ErrorCode, ErrorKind, Result};
pub use executor::Executor;
pub use params::{Params, count_placeholders};
pub use row::{Column, ResultSet, Row, ServerStatus};
pub use session::{Session, SessionObserver};
pub use state::SessionState;
pub use stream::{QueryEvent, QueryStream};
pub use transaction::{IsolationLevel, SavePoint};
pub use transport::{
    Command, CommandKind, ConnectError, Connector, LinkMonitor, LinkWatch, Reply, ServerError,
    Transport, TransportError,
};

pub use mariadb_types::{SqlValue, ToSql, TypeError};
