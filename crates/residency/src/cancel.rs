//! Cancellation tokens for in-flight page loads.
//!
//! The controller hands the host a token alongside every load request. When
//! the page leaves the warm zone (or the document closes) the controller
//! cancels the token; the host observes the cancellation cooperatively and
//! acknowledges it by reporting a cancelled outcome.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for one in-flight page load.
///
/// Clones share the same underlying state, so the controller keeps one clone
/// in the page record and hands another to the host. Cancellation is
/// idempotent and never blocks; the page only leaves `Loading` once the host
/// acknowledges via a cancelled outcome.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it; repeat calls are no-ops.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel()` has been called on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_across_clones() {
        let token = CancellationToken::new();
        let host_side = token.clone();

        token.cancel();
        assert!(token.is_cancelled());
        assert!(host_side.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
