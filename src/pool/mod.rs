//! 连接池模块
//!
//! 每个目标端点一个有界连接池，连接的创建、校验、复位与销毁委托给 [`ConnectionLifecycle`]。

pub mod config;
pub mod connection_pool;
mod erosion;
pub mod lifecycle;

pub use config::{AcquireOrder, PoolConfig};
pub use connection_pool::{ConnectionPool, PoolStats, PooledConnection};
pub use lifecycle::ConnectionLifecycle;
