//! gRPC 状态分类
//!
//! 将调用逻辑返回的 `tonic::Status` 归类为可重试的 [`RpcError::ServiceUnavailable`]
//! 或不可重试的 [`RpcError::Service`]

use super::RpcError;
use tonic::{Code, Status};

/// 状态类错误消息前缀
pub const GRPC_ERROR_PREFIX: &str = "gRPC service error: ";

/// 归类一个 gRPC 状态
///
/// `ResourceExhausted` 与 `Unavailable` 视为服务端暂时不可用，其余状态码一律视为本次调用失败。
pub fn classify_status(status: Status) -> RpcError {
    let code = status.code();
    let message = describe_status(&status);
    match code {
        Code::ResourceExhausted | Code::Unavailable => {
            RpcError::ServiceUnavailable { code, message }
        }
        _ => RpcError::Service { code, message },
    }
}

/// 归类调用逻辑返回的错误
///
/// 能向下转型为 `tonic::Status` 的错误（包括带 context 的）按状态分类，
/// 其余错误原样保存在 [`RpcError::Call`] 中。
pub fn classify_call_error(err: anyhow::Error) -> RpcError {
    match err.downcast::<Status>() {
        Ok(status) => classify_status(status),
        Err(err) => RpcError::Call(err),
    }
}

/// 状态码的大写标识符
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
        #[allow(unreachable_patterns)]
        _ => "UNKNOWN",
    }
}

fn describe_status(status: &Status) -> String {
    let hint = match status.code() {
        Code::DeadlineExceeded => "gRPC client connection has timed out",
        Code::Unavailable => "It's likely the service crashed or is restarting",
        Code::Cancelled => "It's likely a client side interrupt occurred",
        Code::ResourceExhausted => "It's likely the maximum number of concurrent requests was exceeded",
        Code::Internal => "It's likely an out-of-memory or other resource error occurred",
        _ => "Unhandled gRPC status code",
    };
    let name = code_name(status.code());
    if status.message().is_empty() {
        format!("{hint}: {name}")
    } else {
        format!("{hint}: {name}: {}", status.message())
    }
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Configuration(msg) => Status::failed_precondition(msg),
            RpcError::UnknownTarget(id) => {
                Status::not_found(format!("Target-ID {id} was never configured"))
            }
            RpcError::PoolExhausted(msg) => Status::resource_exhausted(msg),
            RpcError::ServiceUnavailable { code, message } | RpcError::Service { code, message } => {
                Status::new(code, message)
            }
            RpcError::Call(err) => Status::internal(err.to_string()),
            RpcError::Cancelled(msg) => Status::cancelled(msg),
            RpcError::Transport(msg) => Status::unavailable(msg),
        }
    }
}
