//! A single database session.
//!
//! A [`Session`] owns one [`Transport`] and tracks its lifecycle
//! ([`SessionState`]), transaction status and last use. Every command goes
//! through the same path:
//!
//! 1. a closed session, or one whose link dropped, rejects the command;
//! 2. an attached [`SessionObserver`] may refuse new work;
//! 3. parameters are validated against the placeholders;
//! 4. the command is sent and the reply classified.
//!
//! A fatal outcome closes the session and notifies the observer *before*
//! the error is returned, so pool accounting is already up to date when the
//! caller sees the failure.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::classify;
use crate::config::Config;
use crate::error::Result;
use crate::executor::Executor;
use crate::params::{NO_PARAMS, Params};
use crate::row::ResultSet;
use crate::state::SessionState;
use crate::stream::QueryStream;
use crate::transaction::{COMMIT, IsolationLevel, ROLLBACK, START_TRANSACTION, SavePoint};
use crate::transport::{Command, CommandKind, Connector, LinkWatch, Reply, Transport};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Receives lifecycle callbacks from a session it is attached to.
///
/// Pools attach an observer to every session they own.
pub trait SessionObserver: Send + Sync {
    /// The session reached `Closed`. Called at most once per attachment.
    fn session_closed(&self, session_id: u64);

    /// Gate for caller-issued commands. Internal commands (release
    /// rollback, health probes) bypass it.
    fn admit_command(&self) -> Result<()> {
        Ok(())
    }
}

/// One managed session to the server.
pub struct Session {
    id: u64,
    thread_id: u32,
    state: SessionState,
    in_transaction: bool,
    created_at: Instant,
    last_used: Instant,
    transport: Box<dyn Transport>,
    link: LinkWatch,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Session {
    /// Open a session: connect, complete the handshake, and return it `Idle`.
    ///
    /// The whole attempt is bounded by `config.connect_timeout`.
    pub async fn connect(connector: &dyn Connector, config: &Config) -> Result<Self> {
        let transport =
            match tokio::time::timeout(config.connect_timeout, connector.connect(config)).await {
                Ok(Ok(transport)) => transport,
                Ok(Err(err)) => return Err(classify::connect_error(&err)),
                Err(_) => return Err(classify::connect_timeout(config.connect_timeout)),
            };
        let mut session = Self::from_transport(transport);
        session.set_state(SessionState::Idle);
        tracing::debug!(
            session_id = session.id,
            thread_id = session.thread_id,
            host = %config.host,
            "session established"
        );
        Ok(session)
    }

    /// Wrap an already connected transport. The session starts `Connecting`.
    fn from_transport(transport: Box<dyn Transport>) -> Self {
        let now = Instant::now();
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            thread_id: transport.thread_id(),
            state: SessionState::Connecting,
            in_transaction: false,
            created_at: now,
            last_used: now,
            link: transport.link(),
            transport,
            observer: None,
        }
    }

    /// Process-unique session id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Server-assigned thread id.
    #[must_use]
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Whether the session is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Whether the transport reported a link drop.
    #[must_use]
    pub fn is_link_dropped(&self) -> bool {
        self.link.is_dropped()
    }

    /// A handle that resolves when the link drops.
    #[must_use]
    pub fn link_watch(&self) -> LinkWatch {
        self.link.clone()
    }

    /// When the session was opened.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the last command completed.
    #[must_use]
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Time since the last command completed.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Attach a lifecycle observer, replacing any previous one.
    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    /// Detach the observer without notifying it.
    pub fn take_observer(&mut self) -> Option<Arc<dyn SessionObserver>> {
        self.observer.take()
    }

    /// Run a command over the text protocol.
    pub async fn query(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        self.run(CommandKind::Query, sql, params, false).await
    }

    /// Run a command as a prepared statement.
    pub async fn execute(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        self.run(CommandKind::Execute, sql, params, false).await
    }

    /// Run a command and expose its outcome as an event stream.
    pub async fn query_stream(&mut self, sql: &str, params: &Params) -> QueryStream {
        QueryStream::new(self.query(sql, params).await)
    }

    /// Open a transaction.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.run(CommandKind::Query, START_TRANSACTION, &NO_PARAMS, false)
            .await?;
        self.in_transaction = true;
        Ok(())
    }

    /// Apply an isolation level, then open a transaction.
    pub async fn begin_transaction_with_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.run(CommandKind::Query, level.as_sql(), &NO_PARAMS, false)
            .await?;
        self.begin_transaction().await
    }

    /// Commit the open transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.run(CommandKind::Query, COMMIT, &NO_PARAMS, false)
            .await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back the open transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        self.run(CommandKind::Query, ROLLBACK, &NO_PARAMS, false)
            .await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Create a savepoint in the open transaction.
    pub async fn save_point(&mut self, name: &str) -> Result<SavePoint> {
        let save_point = SavePoint::new(name)?;
        self.run(CommandKind::Query, &save_point.create_sql(), &NO_PARAMS, false)
            .await?;
        Ok(save_point)
    }

    /// Roll back to a savepoint, keeping the transaction open.
    pub async fn rollback_to(&mut self, save_point: &SavePoint) -> Result<()> {
        self.run(CommandKind::Query, &save_point.rollback_sql(), &NO_PARAMS, false)
            .await?;
        Ok(())
    }

    /// Liveness probe.
    pub async fn ping(&mut self) -> Result<()> {
        self.run(CommandKind::Ping, "", &NO_PARAMS, true).await?;
        Ok(())
    }

    /// Hand an `Idle` session to a caller, probing it first when `validate`
    /// is set. A failed probe closes the session.
    pub async fn checkout(&mut self, validate: bool) -> Result<()> {
        if self.link.is_dropped() {
            self.mark_closed();
        }
        if self.state != SessionState::Idle {
            return Err(classify::closed_session());
        }
        if validate {
            self.set_state(SessionState::Validating);
            if let Err(err) = self.ping().await {
                tracing::warn!(
                    session_id = self.id,
                    thread_id = self.thread_id,
                    error = %err,
                    "health probe failed"
                );
                self.close_transport().await;
                return Err(err);
            }
        }
        self.set_state(SessionState::Active);
        Ok(())
    }

    /// Take an `Active` session back, rolling back an open transaction first
    /// when `reset` is set. A failed rollback closes the session.
    pub async fn checkin(&mut self, reset: bool) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(classify::closed_session());
        }
        if reset && self.in_transaction {
            self.set_state(SessionState::Rollback);
            let outcome = self
                .run(CommandKind::Query, ROLLBACK, &NO_PARAMS, true)
                .await;
            if let Err(err) = outcome {
                tracing::warn!(
                    session_id = self.id,
                    thread_id = self.thread_id,
                    error = %err,
                    "implicit rollback failed"
                );
                self.close_transport().await;
                return Err(err);
            }
            self.in_transaction = false;
        }
        self.set_state(SessionState::Idle);
        tracing::trace!(session_id = self.id, "session checked in");
        Ok(())
    }

    /// Return an `Active` session to `Idle` without a round trip.
    ///
    /// Returns `false`, leaving the session untouched, when it is not
    /// `Active` or when `reset` is set and a transaction is open; use
    /// [`Session::checkin`] then.
    pub fn try_checkin(&mut self, reset: bool) -> bool {
        if self.state != SessionState::Active || (reset && self.in_transaction) {
            return false;
        }
        self.set_state(SessionState::Idle);
        true
    }

    /// Close gracefully. Idempotent.
    pub async fn end(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.set_state(SessionState::Ending);
        self.transport.close().await;
        self.mark_closed();
        tracing::debug!(session_id = self.id, thread_id = self.thread_id, "session ended");
        Ok(())
    }

    /// Alias of [`Session::end`] for standalone sessions.
    pub async fn release(&mut self) -> Result<()> {
        self.end().await
    }

    /// Close immediately without waiting for the link to shut down.
    pub fn destroy(mut self) {
        tracing::debug!(session_id = self.id, thread_id = self.thread_id, "session destroyed");
        self.mark_closed();
    }

    async fn run(
        &mut self,
        kind: CommandKind,
        sql: &str,
        params: &Params,
        internal: bool,
    ) -> Result<ResultSet> {
        if !self.state.is_open() || self.link.is_dropped() {
            self.mark_closed();
            return Err(classify::closed_session().with_command(sql, params));
        }
        if !internal {
            if let Some(observer) = &self.observer {
                observer
                    .admit_command()
                    .map_err(|err| err.with_command(sql, params))?;
            }
        }
        classify::validate_params(sql, params)?;

        let standalone = self.state == SessionState::Idle;
        if standalone {
            self.set_state(SessionState::Active);
        }
        tracing::debug!(
            session_id = self.id,
            sql = sql,
            params_count = params.len(),
            "sending command"
        );

        let outcome = match self.transport.send(Command { kind, sql, params }).await {
            Ok(Reply::Rows(result)) => {
                if let Some(status) = result.status {
                    self.in_transaction = status.in_transaction();
                }
                Ok(result)
            }
            Ok(Reply::Error(packet)) => Err(classify::server_error(&packet)),
            Err(err) => Err(classify::transport_error(&err)),
        };
        self.last_used = Instant::now();

        match outcome {
            Err(err) if err.is_fatal() => {
                tracing::warn!(
                    session_id = self.id,
                    thread_id = self.thread_id,
                    errno = err.errno(),
                    error = %err,
                    "fatal error, closing session"
                );
                self.mark_closed();
                self.transport.close().await;
                Err(err.with_command(sql, params))
            }
            outcome => {
                if standalone && self.state == SessionState::Active {
                    self.set_state(SessionState::Idle);
                }
                outcome.map_err(|err| err.with_command(sql, params))
            }
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if next == SessionState::Closed {
            self.mark_closed();
        } else if self.state.can_transition_to(next) {
            tracing::trace!(session_id = self.id, from = %self.state, to = %next, "state");
            self.state = next;
        }
    }

    async fn close_transport(&mut self) {
        self.mark_closed();
        self.transport.close().await;
    }

    fn mark_closed(&mut self) {
        if self.state != SessionState::Closed {
            tracing::trace!(session_id = self.id, from = %self.state, to = "closed", "state");
            self.state = SessionState::Closed;
            self.in_transaction = false;
        }
        if let Some(observer) = self.observer.take() {
            observer.session_closed(self.id);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("thread_id", &self.thread_id)
            .field("state", &self.state)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for Session {
    async fn query(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        Session::query(self, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        Session::execute(self, sql, params).await
    }
}
