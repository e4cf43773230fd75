//! A hand-rolled cancellation token, grounded in `ocatvius-daemon`'s existing use
//! of `tokio::sync::Notify` for `connection_drop_notifier`. Session cancellation
//! (§5) must unblock an in-flight `next()`, so waiters always re-check the flag
//! after being woken rather than trusting a single `notified()` to mean
//! "cancelled" (a waiter that arrives after `notify_waiters()` has already fired
//! would otherwise hang forever).

use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
};
use tokio::sync::Notify;

#[derive(Clone)]
pub struct CancelToken {
    notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called. Safe to poll repeatedly.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_immediately_once_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_wakes_a_pending_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.unwrap();
    }
}
