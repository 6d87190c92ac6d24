//! 远程调用统一错误类型

use super::code::{ErrorKind, RetryableKind};
use thiserror::Error;
use tonic::Code;

/// 远程调用层统一错误类型
///
/// 只有 [`RpcError::PoolExhausted`] 与 [`RpcError::ServiceUnavailable`] 会被重试，
/// 其余变体在第一次出现时即返回给调用方。
#[derive(Error, Debug)]
pub enum RpcError {
    /// 配置错误（启动期致命）
    #[error("gRPC configuration error: {0}")]
    Configuration(String),

    /// 目标未注册
    #[error("Target-ID {0} was never configured")]
    UnknownTarget(String),

    /// 无法从连接池借出连接（包括超时）
    #[error("Unable to borrow connection from pool: {0}")]
    PoolExhausted(String),

    /// 服务端暂时不可用（资源耗尽 / 不可达）
    #[error("gRPC service error: {message}")]
    ServiceUnavailable { code: Code, message: String },

    /// 其余 gRPC 状态
    #[error("gRPC service error: {message}")]
    Service { code: Code, message: String },

    /// 调用逻辑抛出的原始错误，不做包装改写
    #[error(transparent)]
    Call(anyhow::Error),

    /// 调用被取消
    #[error("gRPC call cancelled: {0}")]
    Cancelled(String),

    /// 建立连接失败
    #[error("gRPC transport error: {0}")]
    Transport(String),
}

impl RpcError {
    // ============================================================
    // 便捷构造方法
    // ============================================================

    /// 创建配置错误
    pub fn configuration(reason: impl Into<String>) -> Self {
        RpcError::Configuration(reason.into())
    }

    /// 创建未知目标错误
    pub fn unknown_target(target_id: impl Into<String>) -> Self {
        RpcError::UnknownTarget(target_id.into())
    }

    /// 创建连接池耗尽错误
    pub fn pool_exhausted(reason: impl Into<String>) -> Self {
        RpcError::PoolExhausted(reason.into())
    }

    /// 创建取消错误
    pub fn cancelled(reason: impl Into<String>) -> Self {
        RpcError::Cancelled(reason.into())
    }

    /// 创建传输层错误
    pub fn transport(reason: impl Into<String>) -> Self {
        RpcError::Transport(reason.into())
    }

    // ============================================================
    // 信息获取方法
    // ============================================================

    /// 获取错误种类
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Configuration(_) => ErrorKind::Configuration,
            RpcError::UnknownTarget(_) => ErrorKind::UnknownTarget,
            RpcError::PoolExhausted(_) => ErrorKind::PoolExhausted,
            RpcError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            RpcError::Service { .. } => ErrorKind::Service,
            RpcError::Call(_) => ErrorKind::Call,
            RpcError::Cancelled(_) => ErrorKind::Cancelled,
            RpcError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// 获取 gRPC 状态码（仅状态类错误）
    pub fn code(&self) -> Option<Code> {
        match self {
            RpcError::ServiceUnavailable { code, .. } | RpcError::Service { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// 获取调用逻辑的原始错误
    pub fn as_call_error(&self) -> Option<&anyhow::Error> {
        match self {
            RpcError::Call(err) => Some(err),
            _ => None,
        }
    }

    /// 映射到可重试集合
    pub fn retryable_kind(&self) -> Option<RetryableKind> {
        self.kind().retryable_kind()
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, RpcError>;
