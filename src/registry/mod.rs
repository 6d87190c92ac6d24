//! 目标注册模块
//!
//! 维护目标 ID 到端点及其连接池的映射

pub mod endpoint;
pub mod endpoint_registry;

pub use endpoint::Endpoint;
pub use endpoint_registry::EndpointRegistry;
