//! One-shot cancellable timers, one slot per concern.
//!
//! Each state machine owns a fixed set of slots (pause confirmation,
//! interruption cooldown, restart backoff), so cancelling a concern is a
//! single well-defined operation. Arming a slot supersedes whatever timer
//! was pending in it.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A single pending timer. Re-arming cancels the predecessor.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    cancel: Option<CancellationToken>,
}

impl TimerSlot {
    /// Cancel any pending timer and schedule `f` to run after `delay`.
    ///
    /// The callback runs on the runtime; callers guard it against state
    /// changes that happened between arming and firing.
    pub fn arm<F>(&mut self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.disarm();
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => f(),
            }
        });
    }

    /// Cancel the pending timer, if any.
    pub fn disarm(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn armed_timer_fires() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut slot = TimerSlot::default();
        let f = Arc::clone(&fired);
        slot.arm(Duration::from_millis(50), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_prevents_firing() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut slot = TimerSlot::default();
        let f = Arc::clone(&fired);
        slot.arm(Duration::from_millis(50), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        slot.disarm();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_previous_timer() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut slot = TimerSlot::default();

        let f = Arc::clone(&fired);
        slot.arm(Duration::from_millis(50), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let f = Arc::clone(&fired);
        slot.arm(Duration::from_millis(200), move || {
            f.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0, "first timer was superseded");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10, "second timer fires once");
    }
}
