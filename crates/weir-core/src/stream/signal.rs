//! One-shot broadcast signals.
//!
//! A [`Latch`] has two states — armed and fired — and transitions exactly
//! once. Any number of tasks can wait on it, before or after it fires, and
//! all of them observe the transition. The buffer uses one latch per item to
//! announce "the next item exists" and another to announce "this item was
//! evicted", so a single fire wakes every parked subscriber without the
//! writer tracking who is listening.

use tokio::sync::watch;

/// A one-shot, multi-waiter signal.
///
/// Backed by a [`watch`] channel carrying a `bool`: firing stores `true`
/// once, and receivers subscribed after the fact still observe the fired
/// state. Firing more than once is a no-op.
///
/// The watch channel's internal synchronization gives the usual
/// release/acquire pairing: writes made before [`fire`](Latch::fire) are
/// visible to any task that observes the latch as fired.
pub struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    /// Creates a new latch in the armed state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fires the latch, waking all current waiters. Idempotent.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` if the latch has fired. Never blocks.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the latch fires.
    ///
    /// Completes immediately if the latch has already fired.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so wait_for cannot observe a closed
        // channel while we are borrowing it.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Latch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latch")
            .field("fired", &self.is_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_latch_starts_armed() {
        let latch = Latch::new();
        assert!(!latch.is_fired());
    }

    #[test]
    fn test_latch_fire_is_idempotent() {
        let latch = Latch::new();
        latch.fire();
        latch.fire();
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn test_wait_after_fire_completes_immediately() {
        let latch = Latch::new();
        latch.fire();
        tokio::time::timeout(Duration::from_secs(1), latch.fired())
            .await
            .expect("fired latch must not block");
    }

    #[tokio::test]
    async fn test_waiters_wake_on_fire() {
        let latch = Arc::new(Latch::new());

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let latch = Arc::clone(&latch);
            waiters.push(tokio::spawn(async move { latch.fired().await }));
        }

        // Give the waiters a chance to park first.
        tokio::time::sleep(Duration::from_millis(10)).await;
        latch.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter must wake")
                .expect("waiter must not panic");
        }
    }

    #[test]
    fn test_debug_format() {
        let latch = Latch::new();
        assert!(format!("{latch:?}").contains("fired: false"));
        latch.fire();
        assert!(format!("{latch:?}").contains("fired: true"));
    }
}
