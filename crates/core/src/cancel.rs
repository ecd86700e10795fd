//! Cancellation and deadlines for long-running reads and recovery passes.
//!
//! Nothing in the retrieval pack pulls in `tokio_util`'s `CancellationToken`,
//! so this is a small hand-rolled equivalent: a shared flag plus an optional
//! wall-clock deadline. Cheap to clone, cheap to check, no async runtime
//! dependency (callers in `escore-infra` combine it with `tokio::select!`
//! themselves where they need to await on it).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A cooperative cancellation flag shared between a caller and the work it
/// handed off (a scan, a recovery pass, a blocking adapter call).
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// An optional point in time after which work should stop, paired with a
/// `CancelToken` so both cooperative cancellation and timeouts share one
/// check at call sites.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    token: CancelToken,
}

/// Why a `Deadline` has fired, if it has. Kept distinct from a plain bool so
/// callers can map each cause to its own error kind (spec.md §7:
/// `Cancelled` vs `DeadlineExceeded` are different variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Live,
    Cancelled,
    TimedOut,
}

impl Deadline {
    pub fn none() -> Self {
        Self {
            at: None,
            token: CancelToken::new(),
        }
    }

    pub fn after(duration: std::time::Duration) -> Self {
        Self {
            at: Some(Instant::now() + duration),
            token: CancelToken::new(),
        }
    }

    pub fn with_token(token: CancelToken) -> Self {
        Self { at: None, token }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn expiry(&self) -> Expiry {
        if self.token.is_cancelled() {
            return Expiry::Cancelled;
        }
        match self.at {
            Some(at) if Instant::now() >= at => Expiry::TimedOut,
            _ => Expiry::Live,
        }
    }

    /// True once the deadline has passed or the token has been cancelled.
    pub fn is_expired(&self) -> bool {
        self.expiry() != Expiry::Live
    }

    /// Every public operation in `escore-infra` calls this at each
    /// suspension point (spec.md §5, "Every such call accepts a
    /// cancellation/deadline handle; when the handle fires, in-flight work
    /// must abort promptly"). `cancelled`/`timed_out` construct the
    /// caller's own error type lazily, so this stays allocation-free on the
    /// hot (`Expiry::Live`) path.
    pub fn check<E>(&self, cancelled: impl FnOnce() -> E, timed_out: impl FnOnce() -> E) -> Result<(), E> {
        match self.expiry() {
            Expiry::Live => Ok(()),
            Expiry::Cancelled => Err(cancelled()),
            Expiry::TimedOut => Err(timed_out()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn no_deadline_never_expires() {
        assert!(!Deadline::none().is_expired());
    }

    #[test]
    fn cancel_token_expires_deadline() {
        let token = CancelToken::new();
        let deadline = Deadline::with_token(token.clone());
        assert!(!deadline.is_expired());
        token.cancel();
        assert!(deadline.is_expired());
    }

    #[test]
    fn elapsed_duration_expires() {
        let deadline = Deadline::after(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(deadline.is_expired());
    }

    #[test]
    fn check_distinguishes_cancelled_from_timed_out() {
        let token = CancelToken::new();
        let cancelled = Deadline::with_token(token.clone());
        token.cancel();
        assert_eq!(cancelled.check(|| "c", || "t"), Err("c"));

        let timed_out = Deadline::after(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(timed_out.check(|| "c", || "t"), Err("t"));

        assert_eq!(Deadline::none().check(|| "c", || "t"), Ok(()));
    }
}
