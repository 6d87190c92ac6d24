//! gRPC 客户端模块
//!
//! 提供传输层配置和基于 `tonic` 通道的连接生命周期实现

use crate::error::{Result, RpcError};
use crate::pool::ConnectionLifecycle;
use crate::registry::Endpoint;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint as TonicEndpoint};
use tracing::debug;

/// 通道内的负载均衡策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingPolicy {
    /// 轮询（默认），通道按需建立连接
    #[default]
    RoundRobin,
    /// 直连第一个地址，创建时即建立连接
    PickFirst,
}

impl fmt::Display for LoadBalancingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalancingPolicy::RoundRobin => write!(f, "round_robin"),
            LoadBalancingPolicy::PickFirst => write!(f, "pick_first"),
        }
    }
}

impl std::str::FromStr for LoadBalancingPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace("-", "_").as_str() {
            "round_robin" | "roundrobin" => Ok(LoadBalancingPolicy::RoundRobin),
            "pick_first" | "pickfirst" => Ok(LoadBalancingPolicy::PickFirst),
            _ => Err(format!("Unknown load balancing policy: {}", s)),
        }
    }
}

/// 传输层配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// HTTP/2 keep-alive 间隔（默认 60 秒）
    pub keep_alive_millis: u64,
    /// keep-alive 应答超时（默认 30 秒）
    pub keep_alive_timeout_millis: u64,
    /// 无活跃调用时是否继续 keep-alive（默认 false）
    pub keep_alive_without_calls: bool,
    /// 负载均衡策略
    pub load_balancing_policy: LoadBalancingPolicy,
    /// 单条响应消息的最大字节数（默认 4 MiB）
    pub max_inbound_message_bytes: usize,
    /// 响应元数据的最大字节数（默认 8 KiB）
    pub max_inbound_metadata_bytes: usize,
    /// 建立连接超时（默认 5 秒）
    pub connect_timeout_millis: u64,
    /// 单次请求超时，`None` 表示不限制
    pub request_timeout_millis: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            keep_alive_millis: 60_000,
            keep_alive_timeout_millis: 30_000,
            keep_alive_without_calls: false,
            load_balancing_policy: LoadBalancingPolicy::RoundRobin,
            max_inbound_message_bytes: 4 * 1024 * 1024,
            max_inbound_metadata_bytes: 8 * 1024,
            connect_timeout_millis: 5_000,
            request_timeout_millis: None,
        }
    }
}

impl TransportConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_alive_millis(mut self, millis: u64) -> Self {
        self.keep_alive_millis = millis;
        self
    }

    pub fn with_keep_alive_timeout_millis(mut self, millis: u64) -> Self {
        self.keep_alive_timeout_millis = millis;
        self
    }

    pub fn with_keep_alive_without_calls(mut self, enable: bool) -> Self {
        self.keep_alive_without_calls = enable;
        self
    }

    pub fn with_load_balancing_policy(mut self, policy: LoadBalancingPolicy) -> Self {
        self.load_balancing_policy = policy;
        self
    }

    pub fn with_max_inbound_message_bytes(mut self, bytes: usize) -> Self {
        self.max_inbound_message_bytes = bytes;
        self
    }

    pub fn with_max_inbound_metadata_bytes(mut self, bytes: usize) -> Self {
        self.max_inbound_metadata_bytes = bytes;
        self
    }

    pub fn with_connect_timeout_millis(mut self, millis: u64) -> Self {
        self.connect_timeout_millis = millis;
        self
    }

    pub fn with_request_timeout_millis(mut self, millis: u64) -> Self {
        self.request_timeout_millis = Some(millis);
        self
    }

    /// 为端点构建 `tonic` 的连接参数
    pub fn build_endpoint(&self, endpoint: &Endpoint) -> Result<TonicEndpoint> {
        let mut builder = TonicEndpoint::from_shared(endpoint.uri()).map_err(|e| {
            RpcError::configuration(format!("Invalid address {}: {}", endpoint.uri(), e))
        })?;

        let max_header_list_size = u32::try_from(self.max_inbound_metadata_bytes).map_err(|_| {
            RpcError::configuration(format!(
                "max_inbound_metadata_bytes {} exceeds {}",
                self.max_inbound_metadata_bytes,
                u32::MAX
            ))
        })?;

        builder = builder
            .connect_timeout(Duration::from_millis(self.connect_timeout_millis))
            .http2_max_header_list_size(max_header_list_size)
            .http2_keep_alive_interval(Duration::from_millis(self.keep_alive_millis))
            .keep_alive_timeout(Duration::from_millis(self.keep_alive_timeout_millis))
            .keep_alive_while_idle(self.keep_alive_without_calls);

        if let Some(timeout) = self.request_timeout_millis {
            builder = builder.timeout(Duration::from_millis(timeout));
        }

        Ok(builder)
    }
}

/// 通道校验探针
pub type ChannelValidator = Arc<dyn Fn(Channel) -> BoxFuture<'static, bool> + Send + Sync>;

/// 通道归还前的复位钩子，返回错误时通道被销毁
pub type ChannelPassivator = Arc<dyn Fn(&mut Channel) -> Result<()> + Send + Sync>;

/// 以 `tonic` 通道为连接的生命周期实现
///
/// 调用方通过桩工厂在通道上构造客户端，例如
/// `|channel| GreeterClient::new(channel.clone()).max_decoding_message_size(limit)`，
/// 其中 `limit` 取自 [`GrpcChannelLifecycle::max_decoding_message_size`]。
#[derive(Clone, Default)]
pub struct GrpcChannelLifecycle {
    transport: TransportConfig,
    validator: Option<ChannelValidator>,
    passivator: Option<ChannelPassivator>,
}

impl GrpcChannelLifecycle {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            validator: None,
            passivator: None,
        }
    }

    /// 安装借出前的校验探针（例如一次健康检查调用）
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(Channel) -> BoxFuture<'static, bool> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// 安装归还时的复位钩子
    pub fn with_passivator<F>(mut self, passivator: F) -> Self
    where
        F: Fn(&mut Channel) -> Result<()> + Send + Sync + 'static,
    {
        self.passivator = Some(Arc::new(passivator));
        self
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// 桩工厂应设置的最大解码消息大小
    pub fn max_decoding_message_size(&self) -> usize {
        self.transport.max_inbound_message_bytes
    }
}

impl fmt::Debug for GrpcChannelLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcChannelLifecycle")
            .field("transport", &self.transport)
            .field("validator", &self.validator.is_some())
            .field("passivator", &self.passivator.is_some())
            .finish()
    }
}

#[async_trait]
impl ConnectionLifecycle for GrpcChannelLifecycle {
    type Connection = Channel;

    async fn create(&self, endpoint: &Endpoint) -> Result<Channel> {
        let builder = self.transport.build_endpoint(endpoint)?;

        let channel = match self.transport.load_balancing_policy {
            LoadBalancingPolicy::PickFirst => builder.connect().await?,
            LoadBalancingPolicy::RoundRobin => Channel::balance_list(std::iter::once(builder)),
        };

        debug!(
            target_id = %endpoint.target_id,
            address = %endpoint.target(),
            policy = %self.transport.load_balancing_policy,
            "Created gRPC channel"
        );
        Ok(channel)
    }

    async fn validate(&self, conn: &Channel) -> bool {
        match &self.validator {
            Some(validator) => validator(conn.clone()).await,
            None => true,
        }
    }

    fn passivate(&self, conn: &mut Channel) -> Result<()> {
        match &self.passivator {
            Some(passivator) => passivator(conn),
            None => Ok(()),
        }
    }

    fn destroy(&self, conn: Channel) {
        drop(conn);
    }
}
