//! Connection pool implementation.
//!
//! All pool bookkeeping lives in one [`PoolState`] behind a single
//! `parking_lot::Mutex`. The lock is only ever held for synchronous
//! bookkeeping, never across an `.await`, so every counter read through
//! [`Pool::status`] is a consistent snapshot.
//!
//! Sessions move between three places:
//!
//! - the idle set, with no observer attached;
//! - a caller, counted as active and observed by the pool, so that a fatal
//!   error or `destroy` updates the counts the moment the session closes;
//! - a waiter's hand-off channel, which already counts as active.
//!
//! Waiters are served strictly in arrival order. A session that becomes
//! available goes to the oldest waiter before it is ever put back in the
//! idle set.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use mariadb_client::classify;
use mariadb_client::{
    Config, Connector, Executor, IsolationLevel, LinkWatch, Params, QueryStream, Result,
    ResultSet, SavePoint, Session, SessionObserver, SessionState,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::ConnectionMetadata;

/// A connection pool for MariaDB and MySQL servers.
///
/// Cloning a `Pool` is cheap; clones share the same sessions.
///
/// # Example
///
/// ```rust,ignore
/// use mariadb_driver_pool::{Pool, PoolConfig};
///
/// let pool = Pool::builder()
///     .connector(connector)
///     .connection_config(client_config)
///     .connection_limit(20)
///     .build()
///     .await?;
///
/// let rows = pool.query("SELECT ? AS a", &params![1]).await?;
///
/// let mut session = pool.get().await?;
/// session.begin_transaction().await?;
/// // ...
/// session.release().await?; // rolls back the open transaction
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    client_config: Config,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    /// Signalled whenever `active` or `connecting` drops while closing.
    drained: Notify,
    observer: Arc<dyn SessionObserver>,
    next_waiter_id: AtomicU64,
    created_at: Instant,
}

struct PoolState {
    closed: bool,
    idle: VecDeque<PoolEntry>,
    active: u32,
    connecting: u32,
    waiters: VecDeque<Waiter>,
    metrics: PoolMetricsInner,
}

impl PoolState {
    fn idle_count(&self) -> u32 {
        u32::try_from(self.idle.len()).unwrap_or(u32::MAX)
    }

    fn total(&self) -> u32 {
        self.idle_count() + self.active
    }

    fn has_capacity(&self, limit: u32) -> bool {
        self.total() + self.connecting < limit
    }
}

/// A session together with the pool's bookkeeping for it.
struct PoolEntry {
    session: Session,
    metadata: ConnectionMetadata,
}

struct Waiter {
    id: u64,
    enqueued_at: Instant,
    tx: oneshot::Sender<Result<PoolEntry>>,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    connections_created: u64,
    connections_closed: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    health_checks_performed: u64,
    health_checks_failed: u64,
    rollbacks_performed: u64,
    rollbacks_failed: u64,
    acquire_timeouts: u64,
}

/// Observer attached to every session a caller holds.
struct PoolHandle {
    pool: Weak<PoolInner>,
}

impl SessionObserver for PoolHandle {
    fn session_closed(&self, session_id: u64) {
        if let Some(inner) = self.pool.upgrade() {
            inner.session_closed(session_id);
        }
    }

    fn admit_command(&self) -> Result<()> {
        match self.pool.upgrade() {
            Some(inner) if inner.state.lock().closed => Err(PoolError::PoolClosed.into()),
            _ => Ok(()),
        }
    }
}

enum Acquire {
    Ready(PoolEntry),
    Queued(WaitTicket),
}

/// A place in the wait queue. Dropping it before the hand-off completes
/// removes the waiter, or gives back a session that already arrived.
struct WaitTicket {
    inner: Arc<PoolInner>,
    id: u64,
    rx: oneshot::Receiver<Result<PoolEntry>>,
    settled: bool,
}

impl WaitTicket {
    async fn wait(mut self, enqueued_at: Instant, deadline: Option<Instant>) -> Result<PoolEntry> {
        let received = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.abandon();
                    return Err(self.inner.acquire_timed_out(enqueued_at));
                }
            },
            None => (&mut self.rx).await,
        };
        self.settled = true;

        match received {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(err)) => {
                self.inner.state.lock().metrics.checkouts_failed += 1;
                Err(err)
            }
            Err(_) => Err(PoolError::PoolClosed.into()),
        }
    }

    fn abandon(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;

        {
            let mut state = self.inner.state.lock();
            if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
                state.waiters.remove(pos);
                return;
            }
        }
        // Already served: the hand-off happened under the lock, so whatever
        // was sent is waiting in the channel.
        self.rx.close();
        if let Ok(Ok(entry)) = self.rx.try_recv() {
            tracing::trace!(session_id = entry.metadata.id, "re-routing session from abandoned waiter");
            if let Some(entry) = self.inner.restore(entry) {
                entry.session.destroy();
            }
        }
    }
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        self.abandon();
    }
}

fn spawn<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
            true
        }
        Err(_) => false,
    }
}

impl Pool {
    /// Create a new pool builder.
    ///
    /// Use the builder to configure the pool before creating it.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a new pool.
    ///
    /// `config.min_connections` sessions are opened in the background;
    /// the rest are created on demand. Must be called within a Tokio runtime.
    pub async fn new(
        connector: Arc<dyn Connector>,
        client_config: Config,
        config: PoolConfig,
    ) -> Result<Self> {
        config.validate()?;
        client_config.validate()?;

        let inner = Arc::new_cyclic(|pool: &Weak<PoolInner>| PoolInner {
            config: config.clone(),
            client_config,
            connector,
            state: Mutex::new(PoolState {
                closed: false,
                idle: VecDeque::new(),
                active: 0,
                connecting: 0,
                waiters: VecDeque::new(),
                metrics: PoolMetricsInner::default(),
            }),
            drained: Notify::new(),
            observer: Arc::new(PoolHandle { pool: pool.clone() }),
            next_waiter_id: AtomicU64::new(1),
            created_at: Instant::now(),
        });

        {
            let mut state = inner.state.lock();
            inner.fill_to_min(&mut state);
        }

        tracing::info!(
            connection_limit = config.connection_limit,
            min_connections = config.min_connections,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Get a session from the pool.
    ///
    /// Returns an idle session when one exists, probing it first if it sat
    /// idle for at least `min_delay_validation`. Otherwise the request is
    /// queued, a new session is opened if the pool is below its limit, and
    /// the request is served in arrival order. It fails with
    /// `ER_GET_CONNECTION_TIMEOUT` once `acquire_timeout` has passed since
    /// the call, and with `ER_POOL_ALREADY_CLOSED` once [`Pool::end`] began.
    pub async fn get(&self) -> Result<PooledSession> {
        let enqueued_at = Instant::now();
        let deadline = self
            .inner
            .config
            .acquire_timeout
            .map(|timeout| enqueued_at + timeout);

        loop {
            let entry = match self.inner.acquire_or_enqueue()? {
                Acquire::Ready(entry) => entry,
                Acquire::Queued(ticket) => ticket.wait(enqueued_at, deadline).await?,
            };
            // The probe counts against the same deadline as the wait. A
            // session dropped mid-probe closes and the observer settles
            // the counts.
            let checked = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.inner.checkout(entry)).await {
                        Ok(checked) => checked,
                        Err(_) => return Err(self.inner.acquire_timed_out(enqueued_at)),
                    }
                }
                None => self.inner.checkout(entry).await,
            };
            match checked {
                Ok(session) => return Ok(session),
                Err(err) => {
                    tracing::debug!(error = %err, "checkout failed, retrying");
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        return Err(self.inner.acquire_timed_out(enqueued_at));
                    }
                }
            }
        }
    }

    /// Try to get an idle session without waiting.
    ///
    /// Returns `None` if no session is idle. Never queues or opens sessions.
    pub async fn try_get(&self) -> Result<Option<PooledSession>> {
        loop {
            let entry = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    state.metrics.checkouts_failed += 1;
                    return Err(PoolError::PoolClosed.into());
                }
                match state.idle.pop_back() {
                    Some(mut entry) => {
                        entry.session.set_observer(Arc::clone(&self.inner.observer));
                        state.active += 1;
                        entry
                    }
                    None => return Ok(None),
                }
            };
            if let Ok(session) = self.inner.checkout(entry).await {
                return Ok(Some(session));
            }
        }
    }

    /// Run a command over the text protocol on a borrowed session.
    ///
    /// The session is released afterwards, whatever the outcome.
    pub async fn query(&self, sql: &str, params: &Params) -> Result<ResultSet> {
        let mut session = self
            .get()
            .await
            .map_err(|err| err.with_command(sql, params))?;
        let outcome = session.query(sql, params).await;
        if let Err(err) = session.release().await {
            tracing::debug!(error = %err, "release after pooled query failed");
        }
        outcome
    }

    /// Run a prepared statement on a borrowed session.
    pub async fn execute(&self, sql: &str, params: &Params) -> Result<ResultSet> {
        let mut session = self
            .get()
            .await
            .map_err(|err| err.with_command(sql, params))?;
        let outcome = session.execute(sql, params).await;
        if let Err(err) = session.release().await {
            tracing::debug!(error = %err, "release after pooled execute failed");
        }
        outcome
    }

    /// Close the pool.
    ///
    /// Queued requests fail with `ER_POOL_ALREADY_CLOSED`, idle sessions are
    /// closed, and sessions held by callers refuse new commands. Resolves
    /// once every held session has been released or destroyed and no
    /// session is still being opened.
    pub async fn end(&self) -> Result<()> {
        let (waiters, idle) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                (VecDeque::new(), VecDeque::new())
            } else {
                state.closed = true;
                tracing::info!(
                    active = state.active,
                    idle = state.idle.len(),
                    queued = state.waiters.len(),
                    "closing connection pool"
                );
                (
                    std::mem::take(&mut state.waiters),
                    std::mem::take(&mut state.idle),
                )
            }
        };

        for waiter in waiters {
            let _ = waiter.tx.send(Err(PoolError::PoolClosed.into()));
        }

        let closed = u64::try_from(idle.len()).unwrap_or(u64::MAX);
        futures_util::future::join_all(idle.into_iter().map(|mut entry| async move {
            if let Err(err) = entry.session.end().await {
                tracing::debug!(session_id = entry.metadata.id, error = %err, "error closing idle session");
            }
        }))
        .await;
        self.inner.state.lock().metrics.connections_closed += closed;

        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            {
                let state = self.inner.state.lock();
                if state.active == 0 && state.connecting == 0 {
                    break;
                }
            }
            drained.await;
        }

        tracing::info!("connection pool closed");
        Ok(())
    }

    /// Check if [`Pool::end`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Sessions currently held by callers.
    #[must_use]
    pub fn active_connections(&self) -> u32 {
        self.inner.state.lock().active
    }

    /// Sessions sitting idle in the pool.
    #[must_use]
    pub fn idle_connections(&self) -> u32 {
        self.inner.state.lock().idle_count()
    }

    /// Live sessions: active plus idle.
    #[must_use]
    pub fn total_connections(&self) -> u32 {
        self.inner.state.lock().total()
    }

    /// Requests waiting for a session.
    #[must_use]
    pub fn task_queue_size(&self) -> u32 {
        u32::try_from(self.inner.state.lock().waiters.len()).unwrap_or(u32::MAX)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            active: state.active,
            idle: state.idle_count(),
            total: state.total(),
            connecting: state.connecting,
            queued: u32::try_from(state.waiters.len()).unwrap_or(u32::MAX),
            max: self.inner.config.connection_limit,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock();
        let inner = &state.metrics;
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            health_checks_performed: inner.health_checks_performed,
            health_checks_failed: inner.health_checks_failed,
            rollbacks_performed: inner.rollbacks_performed,
            rollbacks_failed: inner.rollbacks_failed,
            acquire_timeouts: inner.acquire_timeouts,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for Pool {
    async fn query(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        Pool::query(self, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        Pool::execute(self, sql, params).await
    }
}

impl PoolInner {
    fn acquire_or_enqueue(self: &Arc<Self>) -> Result<Acquire> {
        let mut state = self.state.lock();
        if state.closed {
            state.metrics.checkouts_failed += 1;
            return Err(PoolError::PoolClosed.into());
        }

        // Most recently returned first.
        if let Some(mut entry) = state.idle.pop_back() {
            entry.session.set_observer(Arc::clone(&self.observer));
            state.active += 1;
            return Ok(Acquire::Ready(entry));
        }

        let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter {
            id,
            enqueued_at: Instant::now(),
            tx,
        });
        self.grow_for_waiters(&mut state);
        tracing::trace!(
            active = state.active,
            queued = state.waiters.len(),
            "waiting for a session"
        );

        Ok(Acquire::Queued(WaitTicket {
            inner: Arc::clone(self),
            id,
            rx,
            settled: false,
        }))
    }

    /// Make an entry `Active` for its new holder.
    async fn checkout(self: &Arc<Self>, mut entry: PoolEntry) -> Result<PooledSession> {
        let validate = entry
            .metadata
            .needs_validation(self.config.min_delay_validation);

        let outcome = entry.session.checkout(validate).await;

        let mut state = self.state.lock();
        if validate {
            state.metrics.health_checks_performed += 1;
        }
        match outcome {
            Ok(()) => {
                state.metrics.checkouts_successful += 1;
                drop(state);
                if validate {
                    entry.metadata.mark_health_check();
                }
                entry.metadata.mark_checkout();
                Ok(PooledSession {
                    entry: Some(entry),
                    pool: Arc::clone(self),
                })
            }
            Err(err) => {
                if validate {
                    state.metrics.health_checks_failed += 1;
                }
                drop(state);
                // The session is closed and the pool already notified.
                Err(err)
            }
        }
    }

    /// Give an available session to the oldest live waiter, or park it in
    /// the idle set when nobody waits.
    fn hand_off(&self, state: &mut PoolState, mut entry: PoolEntry) {
        while let Some(Waiter { id, enqueued_at, tx }) = state.waiters.pop_front() {
            entry.session.set_observer(Arc::clone(&self.observer));
            state.active += 1;
            match tx.send(Ok(entry)) {
                Ok(()) => {
                    tracing::trace!(
                        waiter = id,
                        waited_ms = u64::try_from(enqueued_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "session handed to waiter"
                    );
                    return;
                }
                Err(returned) => {
                    state.active -= 1;
                    let Ok(returned) = returned else {
                        return;
                    };
                    entry = returned;
                    entry.session.take_observer();
                }
            }
        }
        state.idle.push_back(entry);
    }

    /// Take back a session whose checkin succeeded, or one handed to a
    /// waiter that went away.
    ///
    /// Returns the entry, still observed, when it must be closed instead:
    /// the pool is closing or the link dropped.
    fn restore(&self, mut entry: PoolEntry) -> Option<PoolEntry> {
        let mut state = self.state.lock();
        if state.closed || entry.session.is_link_dropped() {
            return Some(entry);
        }
        entry.session.take_observer();
        entry.metadata.mark_checkin();
        state.active -= 1;
        tracing::debug!(session_id = entry.metadata.id, "session returned to pool");
        self.hand_off(&mut state, entry);
        None
    }

    async fn checkin(self: &Arc<Self>, mut entry: PoolEntry) -> Result<()> {
        if entry.session.is_closed() {
            return Ok(());
        }

        let reset = self.config.reset_on_release;
        let rolls_back = reset && entry.session.in_transaction();
        let outcome = entry.session.checkin(reset).await;
        if rolls_back {
            let mut state = self.state.lock();
            if outcome.is_ok() {
                state.metrics.rollbacks_performed += 1;
            } else {
                state.metrics.rollbacks_failed += 1;
            }
        }
        outcome?;

        if let Some(mut entry) = self.restore(entry) {
            entry.session.end().await?;
        }
        Ok(())
    }

    fn session_closed(self: &Arc<Self>, session_id: u64) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        state.metrics.connections_closed += 1;
        tracing::debug!(
            session_id,
            active = state.active,
            idle = state.idle.len(),
            "pooled session closed"
        );
        if state.closed {
            drop(state);
            self.drained.notify_waiters();
            return;
        }
        self.replace(&mut state);
    }

    fn detached(self: &Arc<Self>, session_id: u64) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        tracing::debug!(session_id, "session detached from pool");
        if state.closed {
            drop(state);
            self.drained.notify_waiters();
            return;
        }
        self.replace(&mut state);
    }

    /// Open one session in place of one that left the pool.
    fn replace(self: &Arc<Self>, state: &mut PoolState) {
        if !state.closed && state.has_capacity(self.config.connection_limit) {
            self.spawn_create(state);
        }
    }

    /// Open sessions for waiters no pending creation will serve.
    fn grow_for_waiters(self: &Arc<Self>, state: &mut PoolState) {
        while !state.closed
            && (state.connecting as usize) < state.waiters.len()
            && state.has_capacity(self.config.connection_limit)
        {
            self.spawn_create(state);
        }
    }

    fn fill_to_min(self: &Arc<Self>, state: &mut PoolState) {
        while !state.closed && state.total() + state.connecting < self.config.min_connections {
            self.spawn_create(state);
        }
    }

    fn spawn_create(self: &Arc<Self>, state: &mut PoolState) {
        state.connecting += 1;
        let inner = Arc::clone(self);
        if !spawn(async move { inner.create_session().await }) {
            state.connecting -= 1;
            tracing::warn!("no Tokio runtime available, cannot open a pool session");
        }
    }

    async fn create_session(self: Arc<Self>) {
        let outcome = Session::connect(self.connector.as_ref(), &self.client_config).await;

        let mut state = self.state.lock();
        state.connecting -= 1;
        match outcome {
            Ok(session) => {
                state.metrics.connections_created += 1;
                if state.closed {
                    state.metrics.connections_closed += 1;
                    drop(state);
                    session.destroy();
                    self.drained.notify_waiters();
                    return;
                }

                tracing::debug!(
                    session_id = session.id(),
                    thread_id = session.thread_id(),
                    "pool session opened"
                );
                let link = session.link_watch();
                let session_id = session.id();
                let metadata = ConnectionMetadata::new(&session);
                self.hand_off(&mut state, PoolEntry { session, metadata });
                drop(state);
                self.watch_link(session_id, link);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to open pool session");
                while let Some(waiter) = state.waiters.pop_front() {
                    if waiter.tx.send(Err(err.clone())).is_ok() {
                        break;
                    }
                }

                if state.closed {
                    drop(state);
                    self.drained.notify_waiters();
                    return;
                }
                let short = !state.waiters.is_empty()
                    || state.total() + state.connecting < self.config.min_connections;
                drop(state);
                if short {
                    self.schedule_retry();
                }
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>) {
        let pool = Arc::downgrade(self);
        let backoff = self.config.create_retry_backoff;
        spawn(async move {
            tokio::time::sleep(backoff).await;
            if let Some(inner) = pool.upgrade() {
                let mut state = inner.state.lock();
                inner.grow_for_waiters(&mut state);
                inner.fill_to_min(&mut state);
            }
        });
    }

    /// Evict the session from the idle set as soon as its link drops.
    fn watch_link(self: &Arc<Self>, session_id: u64, mut link: LinkWatch) {
        let pool = Arc::downgrade(self);
        spawn(async move {
            let Some(reason) = link.dropped().await else {
                return;
            };
            if let Some(inner) = pool.upgrade() {
                inner.evict_idle(session_id, &reason);
            }
        });
    }

    fn evict_idle(self: &Arc<Self>, session_id: u64, reason: &str) {
        let mut state = self.state.lock();
        let Some(pos) = state.idle.iter().position(|e| e.metadata.id == session_id) else {
            return;
        };
        let evicted = state.idle.remove(pos);
        state.metrics.connections_closed += 1;
        tracing::warn!(session_id, reason, "idle session lost its link");
        self.replace(&mut state);
        drop(state);
        drop(evicted);
    }

    fn acquire_timed_out(&self, enqueued_at: Instant) -> mariadb_client::Error {
        let mut state = self.state.lock();
        state.metrics.acquire_timeouts += 1;
        state.metrics.checkouts_failed += 1;
        let waited = enqueued_at.elapsed();
        tracing::debug!(
            waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            active = state.active,
            idle = state.idle.len(),
            queued = state.waiters.len(),
            "session acquisition timed out"
        );
        PoolError::AcquisitionTimeout {
            waited,
            active: state.active,
            idle: state.idle_count(),
            limit: self.config.connection_limit,
        }
        .into()
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .connector(connector)
///     .connection_config(Config::from_connection_string(conn_str)?)
///     .pool_config(PoolConfig::from_connection_string(conn_str)?)
///     .build()
///     .await?;
/// ```
#[must_use]
pub struct PoolBuilder {
    connector: Option<Arc<dyn Connector>>,
    client_config: Config,
    pool_config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            connector: None,
            client_config: Config::default(),
            pool_config: PoolConfig::default(),
        }
    }

    /// Set how sessions are opened.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set the configuration every session is opened with.
    pub fn connection_config(mut self, config: Config) -> Self {
        self.client_config = config;
        self
    }

    /// Set the pool configuration.
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the maximum number of live sessions.
    pub fn connection_limit(mut self, limit: u32) -> Self {
        self.pool_config.connection_limit = limit;
        self
    }

    /// Set the number of sessions opened at startup.
    pub fn min_connections(mut self, count: u32) -> Self {
        self.pool_config.min_connections = count;
        self
    }

    /// Set the acquisition timeout. A zero duration disables it.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config = self.pool_config.acquire_timeout(timeout);
        self
    }

    /// Set the idle time after which checkout probes the session.
    pub fn min_delay_validation(mut self, delay: Duration) -> Self {
        self.pool_config.min_delay_validation = delay;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool> {
        let connector = self
            .connector
            .ok_or_else(|| mariadb_client::Error::config("a connector is required"))?;
        Pool::new(connector, self.client_config, self.pool_config).await
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Sessions currently held by callers.
    pub active: u32,
    /// Idle sessions available.
    pub idle: u32,
    /// Live sessions (`active + idle`).
    pub total: u32,
    /// Sessions being opened.
    pub connecting: u32,
    /// Requests waiting for a session.
    pub queued: u32,
    /// Maximum allowed sessions.
    pub max: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (f64::from(self.active) / f64::from(self.max)) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total sessions opened since pool start.
    pub connections_created: u64,
    /// Total sessions closed since pool start.
    pub connections_closed: u64,
    /// Successful checkouts.
    pub checkouts_successful: u64,
    /// Failed checkouts (timeouts, pool closed, connect failures).
    pub checkouts_failed: u64,
    /// Health probes performed.
    pub health_checks_performed: u64,
    /// Health probes that failed.
    pub health_checks_failed: u64,
    /// Implicit rollbacks on release.
    pub rollbacks_performed: u64,
    /// Implicit rollbacks that failed.
    pub rollbacks_failed: u64,
    /// Requests that gave up waiting.
    pub acquire_timeouts: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate health check success rate (0.0 to 1.0).
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let passed = self.health_checks_performed - self.health_checks_failed;
        passed as f64 / self.health_checks_performed as f64
    }
}

/// A session checked out of the pool.
///
/// Call [`release`](Self::release) (or its alias [`end`](Self::end)) to
/// return it. Dropping it returns it as well; when a transaction is still
/// open the rollback then runs on a spawned task.
pub struct PooledSession {
    entry: Option<PoolEntry>,
    pool: Arc<PoolInner>,
}

impl PooledSession {
    fn live(&mut self) -> Result<&mut Session> {
        match self.entry.as_mut() {
            Some(entry) => Ok(&mut entry.session),
            None => Err(classify::closed_session()),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.entry.as_ref().map_or(0, |e| e.metadata.id)
    }

    /// Server thread id.
    #[must_use]
    pub fn thread_id(&self) -> u32 {
        self.entry.as_ref().map_or(0, |e| e.metadata.thread_id)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.entry
            .as_ref()
            .map_or(SessionState::Closed, |e| e.session.state())
    }

    /// Whether a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|e| e.session.in_transaction())
    }

    /// The pool's bookkeeping for this session.
    #[must_use]
    pub fn metadata(&self) -> Option<&ConnectionMetadata> {
        self.entry.as_ref().map(|e| &e.metadata)
    }

    /// Run a command over the text protocol.
    pub async fn query(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        self.live()?.query(sql, params).await
    }

    /// Run a command as a prepared statement.
    pub async fn execute(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        self.live()?.execute(sql, params).await
    }

    /// Run a command and expose its outcome as an event stream.
    pub async fn query_stream(&mut self, sql: &str, params: &Params) -> QueryStream {
        match self.live() {
            Ok(session) => session.query_stream(sql, params).await,
            Err(err) => QueryStream::new(Err(err.with_command(sql, params))),
        }
    }

    /// Start a transaction.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.live()?.begin_transaction().await
    }

    /// Start a transaction with the given isolation level.
    pub async fn begin_transaction_with_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.live()?.begin_transaction_with_isolation(level).await
    }

    /// Commit the open transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.live()?.commit().await
    }

    /// Roll back the open transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        self.live()?.rollback().await
    }

    /// Create a savepoint in the open transaction.
    pub async fn save_point(&mut self, name: &str) -> Result<SavePoint> {
        self.live()?.save_point(name).await
    }

    /// Roll back to a savepoint.
    pub async fn rollback_to(&mut self, save_point: &SavePoint) -> Result<()> {
        self.live()?.rollback_to(save_point).await
    }

    /// Return the session to the pool.
    ///
    /// An open transaction is rolled back first; if that fails the session
    /// is closed and the error returned. Releasing after the pool began
    /// closing closes the session.
    pub async fn release(mut self) -> Result<()> {
        match self.entry.take() {
            Some(entry) => self.pool.checkin(entry).await,
            None => Ok(()),
        }
    }

    /// Alias of [`PooledSession::release`].
    pub async fn end(self) -> Result<()> {
        self.release().await
    }

    /// Close the session instead of returning it. The pool opens a
    /// replacement when it is below its limit.
    pub fn destroy(mut self) {
        if let Some(entry) = self.entry.take() {
            entry.session.destroy();
        }
    }

    /// Take the session out of the pool.
    ///
    /// The pool stops counting it and opens a replacement when below its
    /// limit. The returned session is `Idle` unless it already closed.
    pub fn detach(mut self) -> Result<Session> {
        let Some(mut entry) = self.entry.take() else {
            return Err(classify::closed_session());
        };
        if entry.session.take_observer().is_some() {
            self.pool.detached(entry.metadata.id);
        }
        entry.session.try_checkin(false);
        Ok(entry.session)
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        let Some(mut entry) = self.entry.take() else {
            return;
        };
        if entry.session.is_closed() {
            return;
        }

        if entry.session.try_checkin(self.pool.config.reset_on_release) {
            if let Some(entry) = self.pool.restore(entry) {
                entry.session.destroy();
            }
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(&self.pool);
                handle.spawn(async move {
                    if let Err(err) = pool.checkin(entry).await {
                        tracing::debug!(error = %err, "deferred release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    session_id = entry.metadata.id,
                    "no Tokio runtime to roll back on drop, closing session"
                );
                drop(entry);
            }
        }
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("id", &self.id())
            .field("thread_id", &self.thread_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for PooledSession {
    async fn query(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        PooledSession::query(self, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        PooledSession::execute(self, sql, params).await
    }
}
