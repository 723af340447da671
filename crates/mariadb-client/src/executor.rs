//! The command facade shared by sessions and pools.

use async_trait::async_trait;

use crate::error::Result;
use crate::params::Params;
use crate::row::ResultSet;
use crate::stream::QueryStream;

/// Anything that can run commands: a standalone [`Session`](crate::Session),
/// a pooled session, or a pool that borrows a session per command.
///
/// `query` uses the text protocol and `execute` a prepared statement; both
/// share parameter validation, error classification and result shape.
#[async_trait]
pub trait Executor: Send {
    /// Run a command over the text protocol.
    async fn query(&mut self, sql: &str, params: &Params) -> Result<ResultSet>;

    /// Run a command as a prepared statement.
    async fn execute(&mut self, sql: &str, params: &Params) -> Result<ResultSet>;

    /// Run a command and expose its outcome as an event stream.
    async fn query_stream(&mut self, sql: &str, params: &Params) -> QueryStream {
        QueryStream::new(self.query(sql, params).await)
    }
}
