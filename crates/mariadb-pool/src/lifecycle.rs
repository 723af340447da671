//! Per-session bookkeeping kept by the pool.

use std::time::Duration;

use mariadb_client::Session;
use tokio::time::Instant;

/// Metadata about a pooled session.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Session id.
    pub id: u64,
    /// Server thread id.
    pub thread_id: u32,
    /// When the session joined the pool.
    pub created_at: Instant,
    /// When the session was last checked out or returned.
    pub last_used_at: Instant,
    /// When the session last passed a health probe.
    pub last_checked_at: Option<Instant>,
    /// Number of times the session has been checked out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    /// Create metadata for a freshly opened session.
    pub fn new(session: &Session) -> Self {
        let now = Instant::now();
        Self {
            id: session.id(),
            thread_id: session.thread_id(),
            created_at: now,
            last_used_at: now,
            last_checked_at: None,
            checkout_count: 0,
        }
    }

    /// Time since the session was last used.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Whether checkout must probe the session first.
    ///
    /// A zero `min_delay` probes every time.
    #[must_use]
    pub fn needs_validation(&self, min_delay: Duration) -> bool {
        min_delay.is_zero() || self.idle_for() >= min_delay
    }

    /// Mark the session as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
    }

    /// Mark the session as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
    }

    /// Mark the session as health-checked.
    pub fn mark_health_check(&mut self) {
        self.last_checked_at = Some(Instant::now());
    }
}
