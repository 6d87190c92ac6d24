//! gRPC Client Core Library
//!
//! Pooled, retrying invocation layer for calling remote gRPC services from a
//! processing stage: one bounded connection pool per named target, exponential
//! backoff with escalating log severity, and classification of call failures
//! into retryable and terminal errors.

pub mod config;
pub mod error;
pub mod telemetry;

// gRPC 调用层模块
pub mod client;
pub mod invoker;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod retry;

// Re-exports
pub use config::GrpcConfig;
pub use error::{ErrorKind, Result, RetryableKind, RpcError, classify_call_error, classify_status};
pub use telemetry::{LoggingConfig, init_tracing};

pub use client::{
    ChannelPassivator, ChannelValidator, GrpcChannelLifecycle, LoadBalancingPolicy, TransportConfig,
};
pub use invoker::Invoker;
pub use metrics::{InvokerMetrics, MetricsSnapshot};
pub use pool::{
    AcquireOrder, ConnectionLifecycle, ConnectionPool, PoolConfig, PoolStats, PooledConnection,
};
pub use registry::{Endpoint, EndpointRegistry};
pub use retry::*;
