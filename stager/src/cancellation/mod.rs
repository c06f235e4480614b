//! Cooperative cancellation for convergence runs.
//!
//! The engine checks the token at every trigger and poll boundary; a
//! cancelled run surfaces as a distinct [`StagerError::Cancelled`] outcome
//! rather than terminating silently.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{Result, StagerError};

/// A token for cooperative cancellation of a convergence run.
///
/// Cancellation is idempotent; only the first reason is kept. Share it with
/// an `Arc` and cancel from any thread.
#[derive(Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancelToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The first reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Fails with [`StagerError::Cancelled`] if cancellation was requested.
    ///
    /// Called by the engine before every trigger and every poll sleep.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StagerError::Cancelled {
                reason: self
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string()),
            })
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
        assert!(token.checkpoint().is_ok());
    }

    #[test]
    fn test_cancel_first_reason_wins() {
        let token = CancelToken::new();
        token.cancel("operator abort");
        token.cancel("second");
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("operator abort".to_string()));
    }

    #[test]
    fn test_checkpoint_carries_reason() {
        let token = CancelToken::new();
        token.cancel("shutdown");
        let err = token.checkpoint().unwrap_err();
        assert!(matches!(
            err,
            StagerError::Cancelled { ref reason } if reason == "shutdown"
        ));
    }
}
