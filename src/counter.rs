use actix_web::rt::time::Instant;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A [WindowCounter] shared between the store and the callers that resolved it.
pub type SharedCounter = Arc<WindowCounter>;

/// A single fixed window counter.
///
/// The window is aligned to first use rather than to the wall clock; once more than `interval`
/// has passed since the window started, the next access resets the count and starts a new
/// window. A burst straddling two windows can therefore admit up to twice the limit within one
/// interval span.
#[derive(Debug)]
pub struct WindowCounter {
    state: Mutex<State>,
}

#[derive(Debug, Clone, Copy)]
struct State {
    count: u64,
    window_start: Instant,
}

impl State {
    fn expire(&mut self, now: Instant, interval: Duration) {
        if now.saturating_duration_since(self.window_start) > interval {
            self.count = 0;
            self.window_start = now;
        }
    }
}

impl WindowCounter {
    /// A counter with a count of zero whose window starts now.
    pub fn new() -> Self {
        Self::starting_at(0, Instant::now())
    }

    /// A counter seeded with an existing count and window start.
    pub fn starting_at(count: u64, window_start: Instant) -> Self {
        Self {
            state: Mutex::new(State {
                count,
                window_start,
            }),
        }
    }

    /// Consume one unit of quota if any remains in the current window.
    ///
    /// Returns false, leaving the count untouched, when `limit` units have already been consumed.
    pub fn allow(&self, limit: u64, interval: Duration) -> bool {
        let mut state = self.lock();
        let now = Instant::now();
        state.expire(now, interval);
        if state.count < limit {
            state.count += 1;
            true
        } else {
            false
        }
    }

    /// Count one event unconditionally, then report whether the window is still within `limit`.
    ///
    /// Unlike [WindowCounter::allow] a denied call still increments the count.
    pub fn record(&self, limit: u64, interval: Duration) -> bool {
        let mut state = self.lock();
        let now = Instant::now();
        state.expire(now, interval);
        state.count = state.count.saturating_add(1);
        state.count <= limit
    }

    /// Number of units consumed in the current window.
    pub fn count(&self) -> u64 {
        self.lock().count
    }

    pub fn window_start(&self) -> Instant {
        self.lock().window_start
    }

    // Every critical section leaves the state consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);
    const MINUTE: Duration = Duration::from_secs(60);

    #[actix_web::test]
    async fn test_allow_deny() {
        tokio::time::pause();
        let counter = WindowCounter::new();
        for _ in 0..5 {
            // First 5 should be allowed
            assert!(counter.allow(5, MINUTE));
        }
        // Sixth should be denied, without touching the count
        assert!(!counter.allow(5, MINUTE));
        assert_eq!(counter.count(), 5);
    }

    #[actix_web::test]
    async fn test_zero_limit_always_denies() {
        tokio::time::pause();
        let counter = WindowCounter::new();
        assert!(!counter.allow(0, SECOND));
        assert_eq!(counter.count(), 0);
    }

    #[actix_web::test]
    async fn test_reset_after_interval() {
        tokio::time::pause();
        let counter = WindowCounter::new();
        assert!(counter.allow(1, MINUTE));
        assert!(!counter.allow(1, MINUTE));
        // Exactly one interval later the window is still open
        tokio::time::advance(MINUTE).await;
        assert!(!counter.allow(1, MINUTE));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(counter.allow(1, MINUTE));
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.window_start(), Instant::now());
    }

    #[actix_web::test]
    async fn test_boundary_burst() {
        tokio::time::pause();
        let counter = WindowCounter::new();
        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(counter.allow(1, SECOND));
        tokio::time::advance(Duration::from_millis(2)).await;
        // A new window opened 2ms after the previous admission
        assert!(counter.allow(1, SECOND));
    }

    #[actix_web::test]
    async fn test_record_counts_denials() {
        tokio::time::pause();
        let counter = WindowCounter::new();
        assert!(counter.record(2, MINUTE));
        assert!(counter.record(2, MINUTE));
        assert!(!counter.record(2, MINUTE));
        assert!(!counter.record(2, MINUTE));
        assert_eq!(counter.count(), 4);
        tokio::time::advance(MINUTE * 2).await;
        assert!(counter.record(2, MINUTE));
        assert_eq!(counter.count(), 1);
    }

    #[actix_web::test]
    async fn test_starting_at() {
        tokio::time::pause();
        let counter = WindowCounter::starting_at(3, Instant::now());
        assert!(!counter.allow(3, MINUTE));
        assert!(counter.allow(4, MINUTE));
        assert_eq!(counter.count(), 4);
    }

    #[test]
    fn test_concurrent_allow() {
        let counter = WindowCounter::new();
        let limit = 100;
        let admitted = std::sync::atomic::AtomicU64::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        if counter.allow(limit, Duration::from_secs(3600)) {
                            admitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                });
            }
        });
        assert_eq!(admitted.into_inner(), limit);
        assert_eq!(counter.count(), limit);
    }
}
