use std::time::Duration;

/// Retry policy applied around every task executor call.
///
/// `attempt` is the number of attempts already made (1 after the first
/// failure).
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, attempt: u32, error: &str) -> Option<Duration>;
    fn max_attempts(&self) -> u32;
    fn should_retry(&self, attempt: u32, _error: &str) -> bool {
        attempt < self.max_attempts()
    }
}

/// Single attempt, no delay. Used when no strategy is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategyPlugin for NoRetry {
    fn name(&self) -> &str {
        "none"
    }

    fn next_delay(&self, _attempt: u32, _error: &str) -> Option<Duration> {
        None
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}
