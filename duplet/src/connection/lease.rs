use std::time::Duration;
use tokio::time::Instant;

/// Requester-side lease state.
///
/// A LEASE frame grants a request budget valid until a deadline; requests made after the
/// deadline or beyond the budget are refused locally with `REJECTED`. A connection that
/// negotiated leases starts with an exhausted lease and cannot send requests until the
/// responder grants one.
#[derive(Debug)]
pub(crate) struct LeaseState {
    expires_at: Instant,
    remaining: u32,
}

impl LeaseState {
    /// An exhausted lease: no requests allowed until the first LEASE frame arrives.
    pub(crate) fn exhausted() -> LeaseState {
        LeaseState { expires_at: Instant::now(), remaining: 0 }
    }

    /// Re-arms the lease with a fresh time-to-live and request budget.
    pub(crate) fn renew(&mut self, ttl: Duration, number_of_requests: u32) {
        self.expires_at = Instant::now() + ttl;
        self.remaining = number_of_requests;
    }

    /// Consumes one request permit. Returns false when the lease is expired or exhausted.
    pub(crate) fn try_use(&mut self) -> bool {
        if self.remaining == 0 || Instant::now() >= self.expires_at {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Returns the number of requests left on the current lease.
    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn starts_exhausted() {
        let mut lease = LeaseState::exhausted();
        assert!(!lease.try_use());
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_consumed() {
        let mut lease = LeaseState::exhausted();
        lease.renew(Duration::from_secs(30), 2);
        assert!(lease.try_use());
        assert!(lease.try_use());
        assert!(!lease.try_use());
        assert_eq!(lease.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_ttl() {
        let mut lease = LeaseState::exhausted();
        lease.renew(Duration::from_secs(1), 10);
        assert!(lease.try_use());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!lease.try_use());
    }
}
