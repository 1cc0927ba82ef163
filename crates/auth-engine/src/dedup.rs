//! Lease-based deduplication of redirect handling.
//!
//! The embedding shell can deliver the same redirect URL twice (once via the
//! cold-start initial URL and once via the live URL listener). Only one of
//! them may trigger a code exchange. The guard hands out a single lease at a
//! time; a lease also expires on its own so a crashed or abandoned handler
//! cannot wedge redirect handling forever.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Default lease duration; generous enough to cover a slow code exchange.
pub const DEFAULT_DEDUP_LEASE: Duration = Duration::from_secs(8);

/// Single-lease guard around redirect handling.
pub struct AuthEventGuard {
    lease: Duration,
    acquired_at: Mutex<Option<Instant>>,
}

impl AuthEventGuard {
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            acquired_at: Mutex::new(None),
        }
    }

    /// Try to take the lease. Returns false while another holder's lease is
    /// still live; an expired lease is reclaimed.
    pub fn try_acquire(&self) -> bool {
        let mut acquired_at = self.acquired_at.lock().unwrap();
        if let Some(at) = *acquired_at {
            if at.elapsed() < self.lease {
                debug!("redirect lease already held, dropping duplicate");
                return false;
            }
            debug!("reclaiming expired redirect lease");
        }
        *acquired_at = Some(Instant::now());
        true
    }

    /// Release the lease so the next redirect can be handled.
    pub fn release(&self) {
        *self.acquired_at.lock().unwrap() = None;
    }
}

impl Default for AuthEventGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_LEASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_acquire_succeeds() {
        let guard = AuthEventGuard::default();
        assert!(guard.try_acquire());
    }

    #[test]
    fn test_second_acquire_is_rejected_while_held() {
        let guard = AuthEventGuard::default();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
    }

    #[test]
    fn test_release_allows_reacquire() {
        let guard = AuthEventGuard::default();
        assert!(guard.try_acquire());
        guard.release();
        assert!(guard.try_acquire());
    }

    #[test]
    fn test_expired_lease_is_reclaimed() {
        let guard = AuthEventGuard::new(Duration::from_millis(10));
        assert!(guard.try_acquire());
        std::thread::sleep(Duration::from_millis(20));
        // Holder never released, but the lease has lapsed
        assert!(guard.try_acquire());
    }
}
