//! Timeouts, deadlines and cancellation for transfers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use kast_common::constants;

use crate::error::TransferError;

/// Shared cancellation flag.
///
/// Clones observe the same flag; setting it from a signal handler aborts the
/// transfer, including a request already in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits applied to every registry request of a transfer.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Point in time after which no new request is started.
    pub deadline: Option<Instant>,
    /// Caller-controlled cancellation.
    pub cancel: CancelToken,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(constants::DEFAULT_TRANSFER_TIMEOUT_SECS),
            deadline: None,
            cancel: CancelToken::new(),
        }
    }
}

impl TransferOptions {
    /// Options with the given per-request timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Sets an overall deadline `budget` from now.
    #[must_use]
    pub fn deadline_in(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    /// Shares the given cancellation token.
    #[must_use]
    pub fn cancel_with(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fails if the transfer was cancelled or its deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Cancelled` or `TransferError::DeadlineExceeded`.
    pub fn check(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(TransferError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Timeout for the next request: the per-request timeout, capped by the
    /// time left before the deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.deadline.map_or(self.timeout, |d| {
            self.timeout
                .min(d.saturating_duration_since(Instant::now()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let options = TransferOptions::default().cancel_with(token.clone());
        assert!(options.check().is_ok());
        token.cancel();
        assert!(matches!(options.check(), Err(TransferError::Cancelled)));
    }

    #[test]
    fn past_deadline_fails_check() {
        let options = TransferOptions::default().deadline_in(Duration::ZERO);
        assert!(matches!(options.check(), Err(TransferError::DeadlineExceeded)));
        assert_eq!(options.request_timeout(), Duration::ZERO);
    }

    #[test]
    fn request_timeout_without_deadline_is_per_request_timeout() {
        let options = TransferOptions::with_timeout(Duration::from_secs(7));
        assert_eq!(options.request_timeout(), Duration::from_secs(7));
    }
}
