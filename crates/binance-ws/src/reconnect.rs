//! Restart backoff for failed subscriptions
//!
//! Books never retry on their own: a transport failure ends the symbol's
//! session. Callers that want to come back pace their restarts with this.

use std::time::Duration;

/// Exponential backoff with jitter for restarting a failed book
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first restart
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Maximum number of restarts (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        // Every restart costs a REST snapshot, so start slower than a bare
        // socket reconnect would.
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set maximum attempts
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Never restart
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Default::default()
        }
    }

    /// Delay before restart number `attempt` (1-indexed), without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        Duration::from_millis(delay_ms.min(max_ms) as u64)
    }

    /// Apply jitter to a base delay
    pub fn apply_jitter(&self, base: Duration) -> Duration {
        if self.jitter == 0.0 {
            return base;
        }

        let jitter_range = base.as_millis() as f64 * self.jitter;
        let jitter = rand::random::<f64>() * 2.0 * jitter_range - jitter_range;
        let adjusted_ms = (base.as_millis() as f64 + jitter).max(0.0) as u64;

        Duration::from_millis(adjusted_ms)
    }

    /// Check if restart number `attempt` (1-indexed) is allowed
    pub fn should_reconnect(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Jittered delay for restart number `attempt`, or `None` once exhausted
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.should_reconnect(attempt)
            .then(|| self.apply_jitter(self.delay_for_attempt(attempt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!(config.max_attempts.is_none());
    }

    #[test]
    fn test_delay_calculation() {
        let config = ReconnectConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(0.0);

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(800));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(10));
        assert_eq!(config.next_delay(3), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = ReconnectConfig::new().with_jitter(0.5);
        for _ in 0..100 {
            let delay = config.apply_jitter(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_attempt_limit() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.should_reconnect(1));
        assert!(unlimited.should_reconnect(100));

        let limited = ReconnectConfig::default().with_max_attempts(3);
        assert!(limited.should_reconnect(3));
        assert!(!limited.should_reconnect(4));
        assert_eq!(limited.next_delay(4), None);

        let disabled = ReconnectConfig::disabled();
        assert!(!disabled.should_reconnect(1));
    }
}
