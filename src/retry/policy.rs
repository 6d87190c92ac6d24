//! 重试配置

use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};

/// 重试配置
///
/// 一个 [`Invoker`](crate::invoker::Invoker) 下的所有目标共享同一份重试配置。
/// 所有尝试均失败时，累计等待上界为
/// `initial_wait_millis * (multiplier^(max_attempts - 1) - 1) / (multiplier - 1)`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含首次尝试，默认 4）
    pub max_attempts: u32,
    /// 首次失败后的等待时间（默认 64ms）
    pub initial_wait_millis: u64,
    /// 退避倍数（默认 2）
    pub multiplier: u64,
    /// 超过该失败次数后日志升级为 WARN（默认 20）
    pub fails_before_warn: u32,
    /// 单次等待上限，`None` 表示不截断
    pub max_wait_millis: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_wait_millis: 64,
            multiplier: 2,
            fails_before_warn: 20,
            max_wait_millis: None,
        }
    }
}

impl RetryPolicy {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置最大尝试次数
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// 设置首次等待时间
    pub fn with_initial_wait_millis(mut self, millis: u64) -> Self {
        self.initial_wait_millis = millis;
        self
    }

    /// 设置退避倍数
    pub fn with_multiplier(mut self, multiplier: u64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// 设置日志升级阈值
    pub fn with_fails_before_warn(mut self, fails: u32) -> Self {
        self.fails_before_warn = fails;
        self
    }

    /// 设置单次等待上限
    pub fn with_max_wait_millis(mut self, millis: u64) -> Self {
        self.max_wait_millis = Some(millis);
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RpcError::configuration("max_attempts must be at least 1"));
        }
        if self.multiplier == 0 {
            return Err(RpcError::configuration("backoff multiplier must be at least 1"));
        }
        Ok(())
    }
}
