//! 错误种类定义
//!
//! 每个 [`RpcError`](super::RpcError) 变体对应一个 [`ErrorKind`]，
//! 可重试的种类构成一个封闭集合 [`RetryableKind`]，重试执行器只依据它做判断。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// 启动期配置错误（致命）
    Configuration,
    /// 调用了未注册的目标
    UnknownTarget,
    /// 连接池借用失败（可重试）
    PoolExhausted,
    /// 服务端暂时不可用（可重试）
    ServiceUnavailable,
    /// 其他 gRPC 状态错误（本次调用致命）
    Service,
    /// 调用逻辑抛出的任意错误
    Call,
    /// 调用被取消
    Cancelled,
    /// 建立连接失败
    Transport,
}

/// 可重试错误的封闭集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryableKind {
    PoolExhausted,
    ServiceUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorKind {
    /// 获取错误种类的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::UnknownTarget => "UNKNOWN_TARGET",
            ErrorKind::PoolExhausted => "POOL_EXHAUSTED",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::Service => "SERVICE_ERROR",
            ErrorKind::Call => "CALL_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Transport => "TRANSPORT_ERROR",
        }
    }

    /// 映射到可重试集合，不可重试的种类返回 `None`
    pub fn retryable_kind(&self) -> Option<RetryableKind> {
        match self {
            ErrorKind::PoolExhausted => Some(RetryableKind::PoolExhausted),
            ErrorKind::ServiceUnavailable => Some(RetryableKind::ServiceUnavailable),
            ErrorKind::Configuration
            | ErrorKind::UnknownTarget
            | ErrorKind::Service
            | ErrorKind::Call
            | ErrorKind::Cancelled
            | ErrorKind::Transport => None,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.retryable_kind().is_some()
    }
}
