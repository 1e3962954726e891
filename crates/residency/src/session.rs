//! Session guard separating one open/close lifecycle from the next.
//!
//! Every load carries the session token under which it started. A result
//! arriving with a token from a prior session is discarded without touching
//! page state, so a slow load from a closed document can never populate a
//! freshly opened one.

/// Generation counter value identifying one open/close lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

/// Monotonic session counter.
#[derive(Debug, Default)]
pub struct SessionGuard {
    current: u64,
}

impl SessionGuard {
    /// Create a guard with no sessions begun yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, invalidating every token issued before it.
    pub fn begin(&mut self) -> SessionToken {
        self.current += 1;
        SessionToken(self.current)
    }

    /// The token for the current session.
    pub fn current(&self) -> SessionToken {
        SessionToken(self.current)
    }

    /// Whether `token` belongs to the current session.
    pub fn accepts(&self, token: SessionToken) -> bool {
        token.0 == self.current
    }
}
