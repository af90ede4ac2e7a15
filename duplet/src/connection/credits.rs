use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Per-stream flow-control credit.
///
/// One permit allows one `next` payload on the wire. Producers park in [`claim`] when the
/// counter reaches zero and are woken by [`add`] when the peer grants more credit with a
/// REQUEST_N frame. The counter saturates instead of overflowing.
///
/// [`claim`]: Credits::claim
/// [`add`]: Credits::add
#[derive(Debug)]
pub struct Credits {
    permits: AtomicU64,
    granted: Notify,
}

impl Credits {
    /// Create a credit counter holding `initial` permits.
    pub fn new(initial: u32) -> Credits {
        Credits {
            permits: AtomicU64::new(initial as u64),
            granted: Notify::new(),
        }
    }

    /// Adds permits to this counter, saturating at `u64::MAX`, and wakes parked producers.
    pub fn add(&self, n: u32) {
        let mut current = self.permits.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(n as u64);
            match self.permits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.granted.notify_waiters();
    }

    /// Attempts to consume one permit, returning false when none are available.
    pub fn try_claim(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |permits| {
                permits.checked_sub(1)
            })
            .is_ok()
    }

    /// Consumes one permit, suspending until the peer grants credit.
    pub async fn claim(&self) {
        loop {
            let granted = self.granted.notified();
            if self.try_claim() {
                return;
            }
            granted.await;
        }
    }

    /// Returns the number of permits currently held.
    pub fn get(&self) -> u64 {
        self.permits.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn assert_send_sync() {
        assert_send::<Credits>();
        assert_sync::<Credits>();
    }

    #[test]
    fn claim_and_add() {
        let credits = Credits::new(2);
        assert!(credits.try_claim());
        assert!(credits.try_claim());
        assert!(!credits.try_claim());
        credits.add(1);
        assert!(credits.try_claim());
        assert_eq!(credits.get(), 0);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let credits = Credits::new(1);
        credits.add(u32::MAX);
        credits.add(u32::MAX);
        assert!(credits.get() > u32::MAX as u64);
        let before = credits.get();
        credits.add(u32::MAX);
        assert!(credits.get() >= before);
    }

    #[tokio::test]
    async fn claim_parks_until_granted() {
        let credits = Arc::new(Credits::new(0));
        let waiter = {
            let credits = credits.clone();
            tokio::spawn(async move {
                credits.claim().await;
            })
        };
        // the producer must still be parked
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        credits.add(1);
        waiter.await.unwrap();
        assert_eq!(credits.get(), 0);
    }
}
