//! 重试执行器
//!
//! 每次调用的状态机：`READY → EXECUTING → {SUCCESS | RETRYABLE_FAILURE → WAITING → READY | TERMINAL_FAILURE}`。
//! 执行器完全运行在调用方的任务中，不派生任何后台任务。

use super::{BackoffPolicy, ExponentialBackoffPolicy, RetryPolicy};
use crate::error::{Result, RpcError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};

/// 单次调用的尝试状态，调用结束即丢弃
#[derive(Debug, Default)]
pub struct CallAttempt {
    attempt_number: u32,
    last_error: Option<RpcError>,
}

impl CallAttempt {
    /// 当前尝试序号（从 1 开始，尚未开始时为 0）
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    /// 上一次可重试失败的错误
    pub fn last_error(&self) -> Option<&RpcError> {
        self.last_error.as_ref()
    }

    fn begin(&mut self) {
        self.attempt_number += 1;
    }

    fn record_failure(&mut self, err: RpcError) {
        self.last_error = Some(err);
    }
}

/// 重试执行器
pub struct RetryExecutor<P = ExponentialBackoffPolicy> {
    name: String,
    backoff: P,
    fails_before_warn: u32,
    cancel: Option<CancellationToken>,
}

impl RetryExecutor<ExponentialBackoffPolicy> {
    /// 根据重试配置创建指数退避执行器
    pub fn from_policy(name: impl Into<String>, policy: &RetryPolicy) -> Self {
        Self::new(
            name,
            ExponentialBackoffPolicy::from(policy),
            policy.fails_before_warn,
        )
    }
}

impl<P: BackoffPolicy> RetryExecutor<P> {
    pub fn new(name: impl Into<String>, backoff: P, fails_before_warn: u32) -> Self {
        Self {
            name: name.into(),
            backoff,
            fails_before_warn,
            cancel: None,
        }
    }

    /// 绑定取消令牌：令牌取消后，退避等待立即中止并返回 [`RpcError::Cancelled`]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backoff(&self) -> &P {
        &self.backoff
    }

    pub fn fails_before_warn(&self) -> u32 {
        self.fails_before_warn
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// 第 `attempt` 次失败的重试日志级别
    pub fn retry_log_level(&self, attempt: u32) -> Level {
        if attempt <= self.fails_before_warn {
            Level::INFO
        } else {
            Level::WARN
        }
    }

    /// 在重试策略下执行一个工作单元
    ///
    /// `work` 接收当前尝试序号。可重试错误在尝试次数未用尽时等待后重试，
    /// 用尽后原样返回最后一次的错误；不可重试错误立即返回。
    pub async fn execute<T, F, Fut>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.backoff.max_attempts();
        let mut attempt = CallAttempt::default();

        loop {
            if self.is_cancelled() {
                return Err(self.cancelled_error(&attempt));
            }

            attempt.begin();
            let err = match work(attempt.attempt_number()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(
                    executor = %self.name,
                    attempt = attempt.attempt_number(),
                    kind = %err.kind(),
                    "Non-retryable failure, giving up"
                );
                return Err(err);
            }

            if attempt.attempt_number() >= max_attempts {
                error!(
                    executor = %self.name,
                    attempts = attempt.attempt_number(),
                    error = %err,
                    "gRPC call failed, retries exhausted"
                );
                return Err(err);
            }

            let wait = self.backoff.backoff_duration(attempt.attempt_number());
            self.log_retry(attempt.attempt_number(), wait, &err);
            attempt.record_failure(err);
            self.sleep(wait, &attempt).await?;
        }
    }

    fn log_retry(&self, attempt: u32, wait: Duration, err: &RpcError) {
        let wait_ms = wait.as_millis() as u64;
        if self.retry_log_level(attempt) == Level::INFO {
            info!(
                executor = %self.name,
                attempt,
                wait_ms,
                error = %err,
                "gRPC call attempt failed, retrying"
            );
        } else {
            warn!(
                executor = %self.name,
                attempt,
                wait_ms,
                error = %err,
                "gRPC call attempt failed, retrying"
            );
        }
    }

    async fn sleep(&self, wait: Duration, attempt: &CallAttempt) -> Result<()> {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(self.cancelled_error(attempt)),
                    _ = tokio::time::sleep(wait) => Ok(()),
                }
            }
            None => {
                tokio::time::sleep(wait).await;
                Ok(())
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    fn cancelled_error(&self, attempt: &CallAttempt) -> RpcError {
        match attempt.last_error() {
            Some(last) => RpcError::cancelled(format!(
                "{} cancelled after attempt #{}: {}",
                self.name,
                attempt.attempt_number(),
                last
            )),
            None => RpcError::cancelled(format!("{} cancelled before first attempt", self.name)),
        }
    }
}
