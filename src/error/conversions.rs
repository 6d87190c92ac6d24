//! 错误类型转换实现

use super::RpcError;

impl From<tonic::transport::Error> for RpcError {
    fn from(err: tonic::transport::Error) -> Self {
        RpcError::transport(err.to_string())
    }
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        super::grpc::classify_status(status)
    }
}
