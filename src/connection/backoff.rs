//! Reconnect backoff schedule

use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff: doubles on every failure up to `max`, resets on success
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next_delay: Duration,
    retry_at: Option<Instant>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            next_delay: initial,
            retry_at: None,
        }
    }

    /// Time left before the next attempt is allowed, if any
    pub fn remaining(&self) -> Option<Duration> {
        let retry_at = self.retry_at?;
        let now = Instant::now();
        (retry_at > now).then(|| retry_at - now)
    }

    /// Record a failure; returns the delay before the next attempt
    pub fn fail(&mut self) -> Duration {
        let delay = self.next_delay;
        self.retry_at = Some(Instant::now() + delay);
        self.next_delay = std::cmp::min(self.next_delay * 2, self.max);
        delay
    }

    /// Record a success
    pub fn reset(&mut self) {
        self.next_delay = self.initial;
        self.retry_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.fail().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(backoff.remaining(), None);

        backoff.fail();
        assert_eq!(backoff.remaining(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(backoff.remaining(), Some(Duration::from_millis(600)));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(backoff.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_initial_delay() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        backoff.fail();
        backoff.fail();
        backoff.reset();
        assert_eq!(backoff.remaining(), None);
        assert_eq!(backoff.fail(), Duration::from_secs(1));
    }
}
