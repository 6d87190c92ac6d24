//! 错误分类测试

use anyhow::Context;
use grpc_client_core::error::{
    ErrorKind, GRPC_ERROR_PREFIX, RetryableKind, RpcError, classify_call_error, classify_status,
    code_name,
};
use tonic::{Code, Status};

#[derive(Debug, thiserror::Error)]
#[error("payload rejected: {0}")]
struct PayloadError(String);

/// 测试：资源耗尽与不可用归为可重试的服务不可用
#[test]
fn test_retryable_status_codes() {
    for status in [Status::resource_exhausted("busy"), Status::unavailable("down")] {
        let code = status.code();
        let err = classify_status(status);
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(err.retryable_kind(), Some(RetryableKind::ServiceUnavailable));
        assert_eq!(err.code(), Some(code));
        assert!(err.is_retryable());
    }
}

/// 测试：其余状态码全部归为不可重试的服务错误
#[test]
fn test_terminal_status_codes() {
    let codes = [
        Code::Cancelled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::FailedPrecondition,
        Code::Aborted,
        Code::OutOfRange,
        Code::Unimplemented,
        Code::Internal,
        Code::DataLoss,
        Code::Unauthenticated,
    ];
    for code in codes {
        let err = classify_status(Status::new(code, "nope"));
        assert_eq!(err.kind(), ErrorKind::Service, "{}", code_name(code));
        assert!(!err.is_retryable());
    }
}

/// 测试：错误消息带前缀、诊断提示、状态码名称和描述
#[test]
fn test_status_message_format() {
    let err = classify_status(Status::unavailable("connection reset"));
    assert_eq!(
        err.to_string(),
        format!(
            "{}It's likely the service crashed or is restarting: UNAVAILABLE: connection reset",
            GRPC_ERROR_PREFIX
        )
    );

    let err = classify_status(Status::new(Code::DeadlineExceeded, ""));
    assert_eq!(
        err.to_string(),
        "gRPC service error: gRPC client connection has timed out: DEADLINE_EXCEEDED"
    );

    let err = classify_status(Status::permission_denied("who are you"));
    assert!(err.to_string().starts_with(GRPC_ERROR_PREFIX));
    assert!(err.to_string().contains("Unhandled gRPC status code: PERMISSION_DENIED"));
}

/// 测试：带 context 的状态错误仍按状态分类
#[test]
fn test_classify_status_through_context() {
    let err: anyhow::Error = Err::<(), _>(Status::resource_exhausted("too many"))
        .context("calling extractor")
        .unwrap_err();
    let classified = classify_call_error(err);
    assert_eq!(classified.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(classified.code(), Some(Code::ResourceExhausted));
}

/// 测试：非状态错误原样保留，不做包装
#[test]
fn test_arbitrary_error_kept_unchanged() {
    let err = anyhow::Error::new(PayloadError("empty document".to_string()));
    let classified = classify_call_error(err);

    assert_eq!(classified.kind(), ErrorKind::Call);
    assert!(!classified.is_retryable());
    assert_eq!(classified.to_string(), "payload rejected: empty document");

    let original = classified
        .as_call_error()
        .and_then(|err| err.downcast_ref::<PayloadError>())
        .expect("original error preserved");
    assert_eq!(original.0, "empty document");
}

/// 测试：只有连接池耗尽和服务不可用可重试
#[test]
fn test_retryable_set_is_closed() {
    let retryable: Vec<ErrorKind> = [
        ErrorKind::Configuration,
        ErrorKind::UnknownTarget,
        ErrorKind::PoolExhausted,
        ErrorKind::ServiceUnavailable,
        ErrorKind::Service,
        ErrorKind::Call,
        ErrorKind::Cancelled,
        ErrorKind::Transport,
    ]
    .into_iter()
    .filter(ErrorKind::is_retryable)
    .collect();

    assert_eq!(
        retryable,
        vec![ErrorKind::PoolExhausted, ErrorKind::ServiceUnavailable]
    );
}

/// 测试：转换回 gRPC 状态
#[test]
fn test_into_status() {
    let status: Status = RpcError::unknown_target("ocr").into();
    assert_eq!(status.code(), Code::NotFound);
    assert!(status.message().contains("ocr"));

    let status: Status = RpcError::pool_exhausted("Pool exhausted").into();
    assert_eq!(status.code(), Code::ResourceExhausted);

    let status: Status = classify_status(Status::unavailable("down")).into();
    assert_eq!(status.code(), Code::Unavailable);
}
