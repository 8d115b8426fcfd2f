use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Upper bound on keys tracked at once when none is configured.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Fixed-window counter of credential attempts, keyed by the tracking ID the
/// caller presented (existing or not).
///
/// An attempt is counted before the credentials are checked, in the same
/// critical section as the block check, so concurrent guesses cannot overrun
/// the limit. A successful check clears the key.
///
/// The table holds at most `max_keys` live windows. Expired windows are only
/// swept once it is full; if it is still full afterwards, attempts on new keys
/// are refused.
pub struct FailureLimiter {
    max_failures: u32,
    window: Duration,
    max_keys: usize,
    windows: Mutex<HashMap<String, Window>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    attempts: u32,
}

impl FailureLimiter {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self::with_capacity(max_failures, window, DEFAULT_MAX_KEYS)
    }

    pub fn with_capacity(max_failures: u32, window: Duration, max_keys: usize) -> Self {
        Self {
            max_failures: max_failures.max(1),
            window,
            max_keys: max_keys.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count an attempt on `key`. Returns the attempt number within the
    /// current window, or `None` if the key is blocked.
    pub fn acquire(&self, key: &str) -> Option<u32> {
        self.acquire_at(key, Instant::now())
    }

    pub fn clear(&self, key: &str) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn acquire_at(&self, key: &str, now: Instant) -> Option<u32> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(w) = windows.get_mut(key) {
            if now.duration_since(w.started) >= self.window {
                *w = Window { started: now, attempts: 0 };
            }
            if w.attempts >= self.max_failures {
                return None;
            }
            w.attempts += 1;
            return Some(w.attempts);
        }

        if windows.len() >= self.max_keys {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
            if windows.len() >= self.max_keys {
                tracing::warn!(tracked = windows.len(), "attempt table full, refusing new keys");
                return None;
            }
        }

        windows.insert(key.to_string(), Window { started: now, attempts: 1 });
        Some(1)
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn blocks_after_max_failures() {
        let limiter = FailureLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        assert_eq!(limiter.acquire_at("WB-A", t0), Some(1));
        assert_eq!(limiter.acquire_at("WB-A", t0), Some(2));
        assert_eq!(limiter.acquire_at("WB-A", t0), Some(3));
        assert_eq!(limiter.acquire_at("WB-A", t0), None);

        // other keys are unaffected
        assert_eq!(limiter.acquire_at("WB-B", t0), Some(1));
    }

    #[test]
    fn window_expiry_unblocks() {
        let limiter = FailureLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.acquire_at("WB-A", t0), Some(1));
        assert_eq!(limiter.acquire_at("WB-A", t0 + Duration::from_secs(59)), None);
        assert_eq!(limiter.acquire_at("WB-A", t0 + Duration::from_secs(61)), Some(1));
    }

    #[test]
    fn clear_resets_key() {
        let limiter = FailureLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.acquire("WB-A").is_some());
        assert!(limiter.acquire("WB-A").is_none());
        limiter.clear("WB-A");
        assert!(limiter.acquire("WB-A").is_some());
    }

    #[test]
    fn table_never_exceeds_capacity() {
        let limiter = FailureLimiter::with_capacity(5, Duration::from_secs(10), 100);
        let t0 = Instant::now();
        for i in 0..1_000 {
            let admitted = limiter.acquire_at(&format!("WB-{i}"), t0);
            assert_eq!(admitted.is_some(), i < 100);
        }
        assert_eq!(limiter.tracked_keys(), 100);

        // keys already tracked keep their own budget while the table is full
        assert_eq!(limiter.acquire_at("WB-7", t0), Some(2));

        // once the windows lapse the sweep makes room again
        assert_eq!(limiter.acquire_at("WB-late", t0 + Duration::from_secs(11)), Some(1));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn concurrent_attempts_cannot_overrun_the_limit() {
        let limiter = Arc::new(FailureLimiter::new(5, Duration::from_secs(60)));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.acquire("WB-HOT").is_some())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
    }
}
