use super::BackoffPolicy;
use std::time::Duration;

/// 固定延迟退避策略
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoffPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl FixedBackoffPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl BackoffPolicy for FixedBackoffPolicy {
    fn backoff_duration(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
