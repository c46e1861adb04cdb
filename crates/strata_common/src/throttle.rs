//! Latency-bounded staleness checks.
//!
//! Staleness signals (file mtimes, directory listings, tracked URL content)
//! can be expensive to recompute, so every query site in the engine goes
//! through one of the throttles here: within one latency window the last
//! computed value is returned unconditionally, and a burst of concurrent
//! queries collapses to at most one underlying check.

use crate::hash::ContentHash;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
///
/// This is the `last_modified` currency of the whole engine. A clock before
/// the epoch yields 0.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A value recomputed at most once per latency window.
///
/// `get_or_refresh` returns the cached value while the window is open and
/// runs the refresh closure once it has elapsed. A zero latency disables
/// caching entirely. The internal lock is held across the refresh closure,
/// which is what collapses concurrent callers onto a single check.
#[derive(Debug)]
pub struct Throttled<T> {
    latency: Duration,
    state: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> Throttled<T> {
    /// Creates an empty throttle with the given latency window.
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            state: Mutex::new(None),
        }
    }

    /// Returns the configured latency window.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Returns the cached value, refreshing it if the window has elapsed.
    pub fn get_or_refresh<F: FnOnce() -> T>(&self, refresh: F) -> T {
        let mut state = self.state.lock().unwrap();
        if !self.latency.is_zero() {
            if let Some((at, value)) = state.as_ref() {
                if at.elapsed() < self.latency {
                    return value.clone();
                }
            }
        }
        let value = refresh();
        *state = Some((Instant::now(), value.clone()));
        value
    }
}

/// A latency-bounded change detector.
///
/// Holds a fingerprint of some observed state together with the time a
/// change was last detected. `last_modified` recomputes the fingerprint at
/// most once per latency window and bumps the timestamp to "now" only when
/// the fingerprint actually moved, so the returned value changes if and
/// only if the underlying state was seen to change.
///
/// The fingerprint closure may return `None` when the state could not be
/// observed (a transient fetch failure, say); the tracker then keeps the
/// previous fingerprint and timestamp rather than registering a change.
///
/// The tracker is seeded with an initial fingerprint so that the first
/// query after construction does not report a spurious change.
#[derive(Debug)]
pub struct ChangeTracker {
    latency: Duration,
    state: Mutex<TrackerState>,
}

#[derive(Debug)]
struct TrackerState {
    checked_at: Option<Instant>,
    fingerprint: ContentHash,
    last_modified: i64,
}

impl ChangeTracker {
    /// Creates a tracker seeded with the state observed at construction.
    pub fn new(latency: Duration, initial_fingerprint: ContentHash) -> Self {
        Self {
            latency,
            state: Mutex::new(TrackerState {
                checked_at: Some(Instant::now()),
                fingerprint: initial_fingerprint,
                last_modified: now_millis(),
            }),
        }
    }

    /// Returns the time a change was last detected, re-fingerprinting the
    /// observed state if the latency window has elapsed.
    pub fn last_modified<F: FnOnce() -> Option<ContentHash>>(&self, fingerprint: F) -> i64 {
        let mut state = self.state.lock().unwrap();
        if !self.latency.is_zero() {
            if let Some(at) = state.checked_at {
                if at.elapsed() < self.latency {
                    return state.last_modified;
                }
            }
        }
        if let Some(current) = fingerprint() {
            if current != state.fingerprint {
                state.fingerprint = current;
                state.last_modified = now_millis();
            }
        }
        state.checked_at = Some(Instant::now());
        state.last_modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_latency_always_refreshes() {
        let t = Throttled::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            t.get_or_refresh(|| calls.fetch_add(1, Ordering::Relaxed));
        }
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn caches_within_window() {
        let t = Throttled::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let first = t.get_or_refresh(|| {
            calls.fetch_add(1, Ordering::Relaxed);
            7
        });
        let second = t.get_or_refresh(|| {
            calls.fetch_add(1, Ordering::Relaxed);
            8
        });
        assert_eq!(first, 7);
        assert_eq!(second, 7);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn refreshes_after_window() {
        let t = Throttled::new(Duration::from_millis(20));
        assert_eq!(t.get_or_refresh(|| 1), 1);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(t.get_or_refresh(|| 2), 2);
    }

    #[test]
    fn concurrent_burst_collapses_to_one_check() {
        let t = Arc::new(Throttled::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let t = Arc::clone(&t);
            let calls = Arc::clone(&calls);
            handles.push(thread::spawn(move || {
                t.get_or_refresh(|| calls.fetch_add(1, Ordering::Relaxed))
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn tracker_stable_while_unchanged() {
        let tracker = ChangeTracker::new(Duration::ZERO, ContentHash::of_str("a"));
        let first = tracker.last_modified(|| Some(ContentHash::of_str("a")));
        thread::sleep(Duration::from_millis(5));
        let second = tracker.last_modified(|| Some(ContentHash::of_str("a")));
        assert_eq!(first, second);
    }

    #[test]
    fn tracker_bumps_on_change() {
        let tracker = ChangeTracker::new(Duration::ZERO, ContentHash::of_str("a"));
        let before = tracker.last_modified(|| Some(ContentHash::of_str("a")));
        thread::sleep(Duration::from_millis(5));
        let after = tracker.last_modified(|| Some(ContentHash::of_str("b")));
        assert!(after > before);
    }

    #[test]
    fn tracker_honors_latency_window() {
        let tracker = ChangeTracker::new(Duration::from_millis(50), ContentHash::of_str("a"));
        // The change is invisible until the window elapses.
        let initial = tracker.last_modified(|| Some(ContentHash::of_str("b")));
        thread::sleep(Duration::from_millis(80));
        let fresh = tracker.last_modified(|| Some(ContentHash::of_str("b")));
        assert!(fresh > initial);
    }

    #[test]
    fn tracker_unobservable_state_keeps_previous() {
        let tracker = ChangeTracker::new(Duration::ZERO, ContentHash::of_str("a"));
        let before = tracker.last_modified(|| Some(ContentHash::of_str("a")));
        thread::sleep(Duration::from_millis(5));
        let during_outage = tracker.last_modified(|| None);
        assert_eq!(before, during_outage);
    }

    #[test]
    fn tracker_no_spurious_change_at_construction() {
        let tracker = ChangeTracker::new(Duration::ZERO, ContentHash::of_str("a"));
        let constructed_at = tracker.last_modified(|| Some(ContentHash::of_str("a")));
        let again = tracker.last_modified(|| Some(ContentHash::of_str("a")));
        assert_eq!(constructed_at, again);
    }

    #[test]
    fn now_millis_is_positive_and_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(a > 0);
        assert!(b >= a);
    }
}
