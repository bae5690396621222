//! Cooperative cancellation for long-running operations.
//!
//! Query execution checks the token between candidate sentences and between
//! verifier invocations; builds check it at checkpoint boundaries. The token
//! is a shared flag, so cancelling is cheap and safe from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag shared between a caller and an operation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        // Cancelling twice stays cancelled.
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_crosses_threads() {
        let token = CancellationToken::new();
        let seen = token.clone();
        let handle = std::thread::spawn(move || {
            while !seen.is_cancelled() {
                std::thread::yield_now();
            }
            true
        });
        token.cancel();
        assert!(handle.join().unwrap());
    }
}
