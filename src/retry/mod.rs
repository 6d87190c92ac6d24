//! 重试策略模块
//!
//! 退避策略只负责根据尝试序号计算等待时间，
//! 重试循环、异常分类和日志由 [`RetryExecutor`] 负责。

pub mod executor;
pub mod exponential;
pub mod fixed;
pub mod policy;

pub use executor::{CallAttempt, RetryExecutor};
pub use exponential::ExponentialBackoffPolicy;
pub use fixed::FixedBackoffPolicy;
pub use policy::RetryPolicy;

use std::time::Duration;

/// 退避策略 trait
///
/// 尝试序号从 1 开始。第 `i` 次尝试失败后、第 `i + 1` 次尝试开始前等待 `backoff_duration(i)`。
pub trait BackoffPolicy {
    fn backoff_duration(&self, attempt: u32) -> Duration;
    fn max_attempts(&self) -> u32;

    /// 所有尝试都失败时累计等待时间的上界
    fn total_wait_upper_bound(&self) -> Duration {
        (1..self.max_attempts())
            .map(|attempt| self.backoff_duration(attempt))
            .fold(Duration::ZERO, |total, wait| total.saturating_add(wait))
    }
}
