//! 端点注册表

use super::Endpoint;
use crate::config::GrpcConfig;
use crate::error::{Result, RpcError};
use crate::pool::{ConnectionLifecycle, ConnectionPool, PoolConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// 端点注册表
///
/// 目标 ID 到端点及其连接池的映射。注册只发生在启动阶段，
/// 之后以只读方式在调用方之间共享（通常包在 `Arc` 中）。
pub struct EndpointRegistry<L: ConnectionLifecycle> {
    lifecycle: Arc<L>,
    pools: HashMap<String, ConnectionPool<L>>,
}

impl<L: ConnectionLifecycle> EndpointRegistry<L> {
    /// 创建空注册表，所有连接池共用同一个生命周期实现
    pub fn new(lifecycle: L) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
            pools: HashMap::new(),
        }
    }

    /// 按配置注册所有目标
    ///
    /// 主机与端口两组目标 ID 必须完全一致且非空，否则返回配置错误。
    pub fn from_config(config: &GrpcConfig, lifecycle: L) -> Result<Self> {
        config.validate()?;

        let mut registry = Self::new(lifecycle);
        for (target_id, host) in &config.hosts {
            let port = config
                .ports
                .get(target_id)
                .copied()
                .ok_or_else(|| RpcError::configuration(format!("missing port for {}", target_id)))?;
            registry.register(target_id.clone(), host.clone(), port, config.pool.clone())?;
        }
        Ok(registry)
    }

    /// 注册一个目标
    pub fn register(
        &mut self,
        target_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        config: PoolConfig,
    ) -> Result<()> {
        let target_id = target_id.into();
        let host = host.into();

        if target_id.is_empty() {
            return Err(RpcError::configuration("target id must not be empty"));
        }
        if self.pools.contains_key(&target_id) {
            return Err(RpcError::configuration(format!(
                "target {} registered twice",
                target_id
            )));
        }
        if host.trim().is_empty() {
            return Err(RpcError::configuration(format!(
                "host for {} must not be empty",
                target_id
            )));
        }
        if port == 0 {
            return Err(RpcError::configuration(format!(
                "port for {} must not be 0",
                target_id
            )));
        }

        let endpoint = Arc::new(Endpoint::new(target_id.clone(), host, port));
        let pool = ConnectionPool::new(Arc::clone(&endpoint), Arc::clone(&self.lifecycle), config)?;

        info!(
            target_id = %target_id,
            address = %endpoint.target(),
            max_total = pool.config().max_total,
            "Registered gRPC target"
        );
        self.pools.insert(target_id, pool);
        Ok(())
    }

    /// 获取目标的连接池
    pub fn pool_for(&self, target_id: &str) -> Result<&ConnectionPool<L>> {
        self.pools
            .get(target_id)
            .ok_or_else(|| RpcError::unknown_target(target_id))
    }

    pub fn endpoint(&self, target_id: &str) -> Result<&Endpoint> {
        Ok(self.pool_for(target_id)?.endpoint())
    }

    pub fn host(&self, target_id: &str) -> Result<&str> {
        Ok(&self.endpoint(target_id)?.host)
    }

    pub fn port(&self, target_id: &str) -> Result<u16> {
        Ok(self.endpoint(target_id)?.port)
    }

    /// `host:port` 形式的地址
    pub fn target(&self, target_id: &str) -> Result<String> {
        Ok(self.endpoint(target_id)?.target())
    }

    pub fn pool_config(&self, target_id: &str) -> Result<&PoolConfig> {
        Ok(self.pool_for(target_id)?.config())
    }

    /// 已注册的目标 ID（按字典序）
    pub fn target_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.pools.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn lifecycle(&self) -> &L {
        &self.lifecycle
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// 为所有目标预建空闲连接，返回新建总数
    pub async fn prefill_all(&self) -> Result<usize> {
        let mut added = 0;
        for target_id in self.target_ids() {
            added += self.pool_for(target_id)?.prefill().await?;
        }
        Ok(added)
    }

    /// 关闭所有连接池
    pub fn close_all(&self) {
        for pool in self.pools.values() {
            pool.close();
        }
    }
}
