//! 远程调用错误处理模块
//!
//! 提供统一的错误类型、可重试分类以及 gRPC 状态归类

pub mod code;
pub mod conversions;
pub mod grpc;
pub mod rpc_error;

// 重新导出公共类型和函数
pub use code::{ErrorKind, RetryableKind};
pub use grpc::{GRPC_ERROR_PREFIX, classify_call_error, classify_status, code_name};
pub use rpc_error::{Result, RpcError};
