use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Rolling window of recent inference durations
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    window: usize,
    samples: VecDeque<Duration>,
}

impl LatencyTracker {
    /// Create a tracker keeping the last `window` samples (at least one)
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    /// Record a completed inference, evicting the oldest sample when full
    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    /// Mean of the retained samples, `None` before the first sample
    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Rate limiter for streaming partial results
///
/// Admits the first update immediately, then at most one update per
/// `interval`. Rejected updates are dropped, not deferred.
#[derive(Debug, Clone)]
pub struct PartialThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl PartialThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Check whether an update may be emitted now, and if so mark it emitted
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_over_window() {
        let mut tracker = LatencyTracker::new(3);
        assert_eq!(tracker.average(), None);

        for ms in [100, 200, 300, 400] {
            tracker.record(Duration::from_millis(ms));
        }

        // 100 was evicted
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.average(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_zero_window_keeps_one_sample() {
        let mut tracker = LatencyTracker::new(0);
        tracker.record(Duration::from_millis(10));
        tracker.record(Duration::from_millis(20));
        assert_eq!(tracker.average(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_throttle_interval() {
        let start = Instant::now();
        let mut throttle = PartialThrottle::new(Duration::from_millis(100));

        assert!(throttle.try_acquire_at(start));
        assert!(!throttle.try_acquire_at(start + Duration::from_millis(50)));
        assert!(!throttle.try_acquire_at(start + Duration::from_millis(99)));
        assert!(throttle.try_acquire_at(start + Duration::from_millis(100)));
        assert!(!throttle.try_acquire_at(start + Duration::from_millis(150)));
    }
}
