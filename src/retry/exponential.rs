use super::{BackoffPolicy, RetryPolicy};
use std::time::Duration;

/// 指数退避策略
///
/// `wait_millis(i) = initial_wait_millis * multiplier^(i - 1)`，溢出时饱和，
/// 配置了 `max_wait_millis` 时再做截断。
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoffPolicy {
    max_attempts: u32,
    initial_wait_millis: u64,
    multiplier: u64,
    max_wait_millis: Option<u64>,
}

impl ExponentialBackoffPolicy {
    pub fn new(max_attempts: u32, initial_wait_millis: u64, multiplier: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_wait_millis,
            multiplier,
            max_wait_millis: None,
        }
    }

    /// 设置单次等待上限
    pub fn with_max_wait_millis(mut self, max_wait_millis: u64) -> Self {
        self.max_wait_millis = Some(max_wait_millis);
        self
    }

    /// 第 `attempt` 次尝试失败后的等待毫秒数
    pub fn wait_millis(&self, attempt: u32) -> u64 {
        let exponent = attempt.max(1) - 1;
        let factor = self.multiplier.saturating_pow(exponent);
        let wait = self.initial_wait_millis.saturating_mul(factor);
        match self.max_wait_millis {
            Some(cap) => wait.min(cap),
            None => wait,
        }
    }
}

impl From<&RetryPolicy> for ExponentialBackoffPolicy {
    fn from(policy: &RetryPolicy) -> Self {
        let backoff = Self::new(
            policy.max_attempts,
            policy.initial_wait_millis,
            policy.multiplier,
        );
        match policy.max_wait_millis {
            Some(cap) => backoff.with_max_wait_millis(cap),
            None => backoff,
        }
    }
}

impl BackoffPolicy for ExponentialBackoffPolicy {
    fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.wait_millis(attempt))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
