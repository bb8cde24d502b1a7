//! Restart rate limiting and exponential backoff.
//!
//! A flapping component must not consume the whole tree's attention:
//! restarts are counted in a sliding window, and each consecutive restart
//! doubles the delay before the next attempt. Exceeding the window limit
//! escalates to the parent supervisor.

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
// (none)

/// Sliding-window restart counter with exponential delay.
///
/// # Examples
///
/// ```rust
/// use botsys_rt::supervision::RestartBackoff;
/// use std::time::Duration;
///
/// // Allow 5 restarts per minute
/// let mut backoff = RestartBackoff::new(5, Duration::from_secs(60));
/// backoff.record_restart();
/// assert!(!backoff.is_limit_exceeded());
/// assert!(backoff.calculate_delay() >= Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    /// Maximum restarts allowed in the window
    max_restarts: u32,

    /// Time window for counting restarts (sliding)
    restart_window: Duration,

    /// History of restart timestamps (newest first)
    restart_history: VecDeque<DateTime<Utc>>,

    /// Base delay for exponential backoff
    base_delay: Duration,

    /// Maximum delay for exponential backoff
    max_delay: Duration,
}

impl RestartBackoff {
    /// Create a tracker allowing `max_restarts` per `restart_window`,
    /// with the default 100ms base delay capped at 60s.
    pub fn new(max_restarts: u32, restart_window: Duration) -> Self {
        Self::with_delays(
            max_restarts,
            restart_window,
            Duration::from_millis(100),
            Duration::from_secs(60),
        )
    }

    /// Create a tracker with custom backoff delays.
    pub fn with_delays(
        max_restarts: u32,
        restart_window: Duration,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_restarts,
            restart_window,
            restart_history: VecDeque::new(),
            base_delay,
            max_delay,
        }
    }

    /// Record one restart at the current time.
    pub fn record_restart(&mut self) {
        self.expire_old();
        self.restart_history.push_front(Utc::now());
    }

    /// Whether the recorded restarts exceed the window limit.
    pub fn is_limit_exceeded(&mut self) -> bool {
        self.expire_old();
        self.restart_history.len() > self.max_restarts as usize
    }

    /// Exponential delay for the next restart attempt:
    /// `base * 2^(restarts in window)`, capped at the maximum delay.
    pub fn calculate_delay(&mut self) -> Duration {
        self.expire_old();
        let exponent = self.restart_history.len().min(10) as u32;
        let delay = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent.saturating_sub(1)));
        delay.min(self.max_delay)
    }

    /// Restarts currently inside the window.
    pub fn restarts_in_window(&mut self) -> usize {
        self.expire_old();
        self.restart_history.len()
    }

    /// Forget all history (component proven healthy again).
    pub fn reset(&mut self) {
        self.restart_history.clear();
    }

    fn expire_old(&mut self) {
        let Ok(window) = chrono::Duration::from_std(self.restart_window) else {
            return;
        };
        let cutoff = Utc::now() - window;
        while let Some(oldest) = self.restart_history.back() {
            if *oldest < cutoff {
                self.restart_history.pop_back();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_not_exceeded_within_budget() {
        let mut backoff = RestartBackoff::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            backoff.record_restart();
        }
        assert!(!backoff.is_limit_exceeded());
        backoff.record_restart();
        assert!(backoff.is_limit_exceeded());
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let mut backoff = RestartBackoff::with_delays(
            10,
            Duration::from_secs(60),
            Duration::from_millis(100),
            Duration::from_secs(60),
        );
        backoff.record_restart();
        let first = backoff.calculate_delay();
        backoff.record_restart();
        let second = backoff.calculate_delay();
        backoff.record_restart();
        let third = backoff.calculate_delay();

        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(third, Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped() {
        let mut backoff = RestartBackoff::with_delays(
            100,
            Duration::from_secs(600),
            Duration::from_secs(1),
            Duration::from_secs(5),
        );
        for _ in 0..20 {
            backoff.record_restart();
        }
        assert_eq!(backoff.calculate_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_window_slides() {
        let mut backoff = RestartBackoff::new(1, Duration::from_millis(10));
        backoff.record_restart();
        backoff.record_restart();
        assert!(backoff.is_limit_exceeded());
        std::thread::sleep(Duration::from_millis(25));
        assert!(!backoff.is_limit_exceeded());
        assert_eq!(backoff.restarts_in_window(), 0);
    }

    #[test]
    fn test_reset() {
        let mut backoff = RestartBackoff::new(1, Duration::from_secs(60));
        backoff.record_restart();
        backoff.record_restart();
        backoff.reset();
        assert!(!backoff.is_limit_exceeded());
    }
}
