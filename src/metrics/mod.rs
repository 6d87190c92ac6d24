//! 调用指标收集模块

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// 保留耗时样本的调用次数
const LATENCY_WINDOW: usize = 1000;

/// 指标快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// 调用总数（一次 `call` / `call_batch` 计一次）
    pub calls_total: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    /// 尝试总数（含首次尝试）
    pub attempts_total: u64,
    /// 重试次数（不含首次尝试）
    pub retries_total: u64,
    /// 累计耗时（毫秒）
    pub latency_total_ms: u64,
    /// 最近调用的耗时（毫秒）
    pub recent_latency_ms: Vec<u64>,
}

impl MetricsSnapshot {
    /// 最近调用的平均耗时
    pub fn average_latency_ms(&self) -> Option<u64> {
        if self.recent_latency_ms.is_empty() {
            None
        } else {
            Some(self.recent_latency_ms.iter().sum::<u64>() / self.recent_latency_ms.len() as u64)
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    calls_total: u64,
    calls_succeeded: u64,
    calls_failed: u64,
    attempts_total: u64,
    retries_total: u64,
    latency_total_ms: u64,
    recent_latency_ms: VecDeque<u64>,
}

/// 调用指标收集器
#[derive(Clone, Default)]
pub struct InvokerMetrics {
    counters: Arc<RwLock<Counters>>,
}

impl InvokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次尝试，`attempt` 从 1 开始
    pub async fn record_attempt(&self, attempt: u32) {
        let mut counters = self.counters.write().await;
        counters.attempts_total += 1;
        if attempt > 1 {
            counters.retries_total += 1;
        }
    }

    /// 记录一次调用的最终结果
    pub async fn record_call(&self, success: bool, duration: Duration) {
        let mut counters = self.counters.write().await;
        counters.calls_total += 1;

        if success {
            counters.calls_succeeded += 1;
        } else {
            counters.calls_failed += 1;
        }

        let millis = duration.as_millis() as u64;
        counters.latency_total_ms = counters.latency_total_ms.saturating_add(millis);
        counters.recent_latency_ms.push_back(millis);

        if counters.recent_latency_ms.len() > LATENCY_WINDOW {
            counters.recent_latency_ms.pop_front();
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read().await;
        MetricsSnapshot {
            calls_total: counters.calls_total,
            calls_succeeded: counters.calls_succeeded,
            calls_failed: counters.calls_failed,
            attempts_total: counters.attempts_total,
            retries_total: counters.retries_total,
            latency_total_ms: counters.latency_total_ms,
            recent_latency_ms: counters.recent_latency_ms.iter().copied().collect(),
        }
    }
}
