//! Failure counting for actions that are retried every cycle.

use std::collections::HashMap;
use std::time::Duration;

use drover_id::DescriptorId;
use tokio::time::Instant;

/// Counts consecutive failures per descriptor within a sliding window.
///
/// Retries never stop; the tracker only tells the caller when a descriptor
/// has been failing long enough to deserve a louder log line.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_retries: u32,
    window: Duration,
    /// descriptor -> (count, first failure in window)
    failures: HashMap<DescriptorId, (u32, Instant)>,
}

impl RetryTracker {
    pub fn new(max_retries: u32, window: Duration) -> Self {
        Self {
            max_retries,
            window,
            failures: HashMap::new(),
        }
    }

    /// Record a failure and return the count within the current window.
    pub fn record_failure(&mut self, id: DescriptorId) -> u32 {
        let now = Instant::now();
        let (count, first) = self.failures.entry(id).or_insert((0, now));

        if now.duration_since(*first) > self.window {
            *count = 0;
            *first = now;
        }

        *count = count.saturating_add(1);
        *count
    }

    /// True once a descriptor has failed more than `max_retries` times in the window.
    pub fn is_exhausted(&self, id: DescriptorId) -> bool {
        let Some((count, first)) = self.failures.get(&id) else {
            return false;
        };
        Instant::now().duration_since(*first) <= self.window && *count > self.max_retries
    }

    /// Forget a descriptor (on success or removal).
    pub fn clear(&mut self, id: DescriptorId) {
        self.failures.remove(&id);
    }

    /// Drop entries whose window has passed.
    pub fn prune(&mut self) {
        let now = Instant::now();
        let window = self.window;
        self.failures
            .retain(|_, (_, first)| now.duration_since(*first) <= window);
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion() {
        let mut tracker = RetryTracker::new(2, Duration::from_secs(60));
        let a = DescriptorId::new();
        let b = DescriptorId::new();

        assert_eq!(tracker.record_failure(a), 1);
        assert_eq!(tracker.record_failure(a), 2);
        assert!(!tracker.is_exhausted(a));
        assert_eq!(tracker.record_failure(a), 3);
        assert!(tracker.is_exhausted(a));
        assert!(!tracker.is_exhausted(b));

        tracker.clear(a);
        assert!(!tracker.is_exhausted(a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_count() {
        let mut tracker = RetryTracker::new(1, Duration::from_secs(10));
        let id = DescriptorId::new();

        tracker.record_failure(id);
        tracker.record_failure(id);
        assert!(tracker.is_exhausted(id));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!tracker.is_exhausted(id));
        assert_eq!(tracker.record_failure(id), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        tracker.prune();
        assert!(tracker.is_empty());
    }
}
