//! Session lifecycle states.
//!
//! ```text
//! Connecting -> Idle        (handshake ok)
//! Connecting -> Closed      (handshake fails)
//! Idle       -> Active      (checkout, or a standalone command)
//! Idle       -> Validating  (checkout after a long idle period)
//! Validating -> Active      (probe ok)
//! Validating -> Closed      (probe fails)
//! Active     -> Idle        (command done / checkin without open transaction)
//! Active     -> Rollback    (checkin with open transaction)
//! Rollback   -> Idle | Closed
//! Idle | Active -> Ending -> Closed
//! any        -> Closed      (fatal error, destroy)
//! ```
//!
//! `Closed` is terminal.

use std::fmt;

/// Lifecycle state of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Handshake in progress.
    Connecting,
    /// Open and not held by any caller.
    Idle,
    /// Held by exactly one caller.
    Active,
    /// Running a liveness probe before being handed out.
    Validating,
    /// Rolling back a transaction left open at release.
    Rollback,
    /// Graceful shutdown in progress.
    Ending,
    /// Unusable. Never left.
    Closed,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Connecting, Idle) => true,
            (Idle, Active | Validating | Ending) => true,
            (Validating, Active) => true,
            (Active, Idle | Rollback | Ending) => true,
            (Rollback, Idle) => true,
            _ => false,
        }
    }

    /// Whether the session can still run commands.
    #[must_use]
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Connecting | Self::Ending | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Validating => "validating",
            Self::Rollback => "rollback",
            Self::Ending => "ending",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    #[test]
    fn test_closed_is_terminal() {
        for next in [Connecting, Idle, Active, Validating, Rollback, Ending, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_release_paths() {
        assert!(Active.can_transition_to(Idle));
        assert!(Active.can_transition_to(Rollback));
        assert!(Rollback.can_transition_to(Idle));
        assert!(Rollback.can_transition_to(Closed));
        assert!(!Rollback.can_transition_to(Active));
    }

    #[test]
    fn test_validation_paths() {
        assert!(Idle.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Active));
        assert!(!Validating.can_transition_to(Idle));
        assert!(!Connecting.can_transition_to(Active));
    }

    #[test]
    fn test_ending() {
        assert!(Idle.can_transition_to(Ending));
        assert!(Active.can_transition_to(Ending));
        assert!(Ending.can_transition_to(Closed));
        assert!(!Ending.can_transition_to(Idle));
        assert!(!Ending.is_open());
        assert!(Idle.is_open());
    }
}
