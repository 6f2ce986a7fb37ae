use tokio::time::Duration;
use tokio::time::Instant;

/// Minimum time between two fetches of the same sensor
pub const MIN_TIME_BETWEEN_UPDATES: Duration = Duration::from_secs(60);

/// Suppresses work that was last completed less than `min_interval` ago.
///
/// Uses tokio's clock so tests can pause and advance time.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_run: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run: None,
        }
    }

    /// Whether work may run at `now`
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.min_interval,
        }
    }

    /// Record that work completed at `now`
    pub fn mark(&mut self, now: Instant) {
        self.last_run = Some(now);
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(MIN_TIME_BETWEEN_UPDATES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_before_first_run() {
        let throttle = Throttle::default();
        assert!(throttle.is_ready(Instant::now()));
    }

    #[test]
    fn test_interval_is_exclusive() {
        let mut throttle = Throttle::new(Duration::from_secs(60));
        let start = Instant::now();
        throttle.mark(start);

        assert!(!throttle.is_ready(start));
        assert!(!throttle.is_ready(start + Duration::from_secs(59)));
        assert!(!throttle.is_ready(start + Duration::from_secs(60)));
        assert!(throttle.is_ready(start + Duration::from_secs(61)));
    }
}
