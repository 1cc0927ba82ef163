//! Background-duration timeout checks.
//!
//! When the app backgrounds we persist a timestamp; on foreground we compare
//! the elapsed wall-clock time against a threshold and tell the session
//! manager whether the session should be torn down. Persisting the timestamp
//! makes the check survive a process restart while backgrounded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use app_storage::PrefsManager;

/// Default background duration after which the session is torn down.
pub const DEFAULT_BACKGROUND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Outcome of a foreground timeout check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutVerdict {
    /// No background timestamp was recorded; nothing to check.
    NoCheckOwed,
    /// The app was backgrounded for less than the threshold.
    Within(Duration),
    /// The app was backgrounded for at least the threshold.
    Expired(Duration),
}

/// Tracks how long the app spent in the background.
pub struct BackgroundTimeoutGuard {
    prefs: Arc<PrefsManager>,
    threshold: Duration,
}

impl BackgroundTimeoutGuard {
    pub fn new(prefs: Arc<PrefsManager>, threshold: Duration) -> Self {
        Self { prefs, threshold }
    }

    /// Record the moment the app entered the background.
    ///
    /// Storage failures are logged and swallowed; a missed stamp degrades to
    /// skipping the next foreground check, which is safer than failing the
    /// background transition itself.
    pub fn note_background(&self) {
        if let Err(e) = self.prefs.set_background_entered_at(Utc::now()) {
            warn!(error = %e, "failed to persist background timestamp");
        }
    }

    /// Compare elapsed background time against the threshold.
    ///
    /// The stored timestamp is consumed: it is cleared whatever the verdict,
    /// so one background stint is checked at most once.
    pub fn check_foreground(&self) -> TimeoutVerdict {
        let entered_at = match self.prefs.get_background_entered_at() {
            Ok(Some(at)) => at,
            Ok(None) => return TimeoutVerdict::NoCheckOwed,
            Err(e) => {
                warn!(error = %e, "failed to read background timestamp");
                return TimeoutVerdict::NoCheckOwed;
            }
        };

        if let Err(e) = self.prefs.clear_background_entered_at() {
            warn!(error = %e, "failed to clear background timestamp");
        }

        // A clock that went backwards while backgrounded reads as zero elapsed
        let elapsed = (Utc::now() - entered_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if elapsed >= self.threshold {
            debug!(elapsed_secs = elapsed.as_secs(), "background timeout expired");
            TimeoutVerdict::Expired(elapsed)
        } else {
            TimeoutVerdict::Within(elapsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_storage::MemoryStorage;
    use chrono::Duration as ChronoDuration;

    fn guard(threshold: Duration) -> (BackgroundTimeoutGuard, Arc<PrefsManager>) {
        let prefs = Arc::new(PrefsManager::new(Box::new(MemoryStorage::new())));
        (BackgroundTimeoutGuard::new(prefs.clone(), threshold), prefs)
    }

    #[test]
    fn test_no_timestamp_means_no_check_owed() {
        let (guard, _) = guard(DEFAULT_BACKGROUND_TIMEOUT);
        assert_eq!(guard.check_foreground(), TimeoutVerdict::NoCheckOwed);
    }

    #[test]
    fn test_short_background_is_within() {
        let (guard, prefs) = guard(Duration::from_secs(30 * 60));
        prefs
            .set_background_entered_at(Utc::now() - ChronoDuration::minutes(5))
            .unwrap();

        match guard.check_foreground() {
            TimeoutVerdict::Within(elapsed) => {
                assert!(elapsed >= Duration::from_secs(4 * 60));
            }
            other => panic!("expected Within, got {other:?}"),
        }
    }

    #[test]
    fn test_long_background_is_expired() {
        let (guard, prefs) = guard(Duration::from_secs(30 * 60));
        prefs
            .set_background_entered_at(Utc::now() - ChronoDuration::minutes(40))
            .unwrap();

        match guard.check_foreground() {
            TimeoutVerdict::Expired(elapsed) => {
                assert!(elapsed >= Duration::from_secs(30 * 60));
            }
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn test_timestamp_is_consumed_by_check() {
        let (guard, prefs) = guard(Duration::from_secs(1));
        prefs
            .set_background_entered_at(Utc::now() - ChronoDuration::minutes(1))
            .unwrap();

        assert!(matches!(guard.check_foreground(), TimeoutVerdict::Expired(_)));
        // Second check owes nothing
        assert_eq!(guard.check_foreground(), TimeoutVerdict::NoCheckOwed);
        assert!(prefs.get_background_entered_at().unwrap().is_none());
    }

    #[test]
    fn test_future_timestamp_reads_as_within() {
        let (guard, prefs) = guard(Duration::from_secs(30 * 60));
        prefs
            .set_background_entered_at(Utc::now() + ChronoDuration::minutes(10))
            .unwrap();

        assert_eq!(
            guard.check_foreground(),
            TimeoutVerdict::Within(Duration::ZERO)
        );
    }

    #[test]
    fn test_note_background_persists_now() {
        let (guard, prefs) = guard(DEFAULT_BACKGROUND_TIMEOUT);
        guard.note_background();
        let at = prefs.get_background_entered_at().unwrap().unwrap();
        assert!((Utc::now() - at).num_seconds() < 5);
    }
}
