//! 远程调用编排模块
//!
//! 把连接借用、调用执行、失败分类与重试串成一次完整的远程调用

mod batch;

use crate::config::GrpcConfig;
use crate::error::{Result, classify_call_error};
use crate::metrics::InvokerMetrics;
use crate::pool::{ConnectionLifecycle, PoolStats, PooledConnection};
use crate::registry::EndpointRegistry;
use crate::retry::{RetryExecutor, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 远程调用编排器
///
/// 一个流水线阶段持有一个 `Invoker`，所有目标共享同一份重试配置。
/// 调用完全运行在调用方的任务中，可以被任意多个任务并发使用。
pub struct Invoker<L: ConnectionLifecycle> {
    registry: Arc<EndpointRegistry<L>>,
    retry_policy: RetryPolicy,
    executor: RetryExecutor,
    metrics: InvokerMetrics,
    shutdown: CancellationToken,
}

impl<L: ConnectionLifecycle> Invoker<L> {
    /// 创建编排器，`name` 出现在所有重试日志中
    pub fn new(
        name: impl Into<String>,
        registry: EndpointRegistry<L>,
        retry_policy: RetryPolicy,
    ) -> Result<Self> {
        retry_policy.validate()?;

        let shutdown = CancellationToken::new();
        let executor =
            RetryExecutor::from_policy(name, &retry_policy).with_cancellation(shutdown.clone());

        Ok(Self {
            registry: Arc::new(registry),
            retry_policy,
            executor,
            metrics: InvokerMetrics::new(),
            shutdown,
        })
    }

    /// 按配置注册所有目标并创建编排器
    pub fn from_config(name: impl Into<String>, config: &GrpcConfig, lifecycle: L) -> Result<Self> {
        let registry = EndpointRegistry::from_config(config, lifecycle)?;
        Self::new(name, registry, config.retry.clone())
    }

    /// 在重试策略下执行一次远程调用
    ///
    /// 每次尝试：借出连接，用 `stub_factory` 构造客户端桩，执行 `call_logic`。
    /// 成功时归还连接；失败时作废连接并分类错误，只有连接池耗尽与服务暂时不可用会被重试。
    /// 请求在每次尝试时克隆一份重新发送。
    pub async fn call<S, Q, R, SF, CF, Fut>(
        &self,
        target_id: &str,
        stub_factory: SF,
        call_logic: CF,
        request: Q,
    ) -> Result<R>
    where
        SF: Fn(&L::Connection) -> S,
        CF: Fn(S, Q) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
        Q: Clone,
    {
        let started = Instant::now();
        let stub_factory = &stub_factory;
        let call_logic = &call_logic;

        let result = self
            .executor
            .execute(move |attempt| {
                self.attempt(target_id, attempt, stub_factory, call_logic, request.clone())
            })
            .await;

        self.metrics.record_call(result.is_ok(), started.elapsed()).await;
        result
    }

    async fn attempt<S, Q, R, SF, CF, Fut>(
        &self,
        target_id: &str,
        attempt: u32,
        stub_factory: &SF,
        call_logic: &CF,
        request: Q,
    ) -> Result<R>
    where
        SF: Fn(&L::Connection) -> S,
        CF: Fn(S, Q) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let conn = self.acquire(target_id, attempt).await?;
        let stub = stub_factory(&conn);

        match call_logic(stub, request).await {
            Ok(response) => {
                conn.release();
                Ok(response)
            }
            Err(err) => {
                conn.invalidate();
                let err = classify_call_error(err);
                debug!(
                    target_id,
                    attempt,
                    kind = %err.kind(),
                    error = %err,
                    "gRPC call failed, connection invalidated"
                );
                Err(err)
            }
        }
    }

    async fn acquire(&self, target_id: &str, attempt: u32) -> Result<PooledConnection<L>> {
        self.metrics.record_attempt(attempt).await;
        self.registry.pool_for(target_id)?.acquire().await
    }

    /// 为所有目标预建 `min_idle` 个空闲连接
    pub async fn prefill(&self) -> Result<usize> {
        self.registry.prefill_all().await
    }

    /// 关闭编排器：中止进行中的退避等待并关闭所有连接池
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.close_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn registry(&self) -> &EndpointRegistry<L> {
        &self.registry
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    pub fn metrics(&self) -> &InvokerMetrics {
        &self.metrics
    }

    pub fn lifecycle(&self) -> &L {
        self.registry.lifecycle()
    }

    pub fn host(&self, target_id: &str) -> Result<&str> {
        self.registry.host(target_id)
    }

    pub fn port(&self, target_id: &str) -> Result<u16> {
        self.registry.port(target_id)
    }

    /// `host:port` 形式的地址
    pub fn target(&self, target_id: &str) -> Result<String> {
        self.registry.target(target_id)
    }

    pub fn target_ids(&self) -> Vec<&str> {
        self.registry.target_ids()
    }

    pub fn pool_stats(&self, target_id: &str) -> Result<PoolStats> {
        Ok(self.registry.pool_for(target_id)?.stats())
    }
}
