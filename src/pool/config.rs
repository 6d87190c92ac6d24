//! 连接池配置模块

use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 空闲连接的取出顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquireOrder {
    /// 后进先出：优先复用最近归还的连接（默认）
    #[default]
    Lifo,
    /// 先进先出：轮流使用所有空闲连接
    Fifo,
}

impl fmt::Display for AcquireOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireOrder::Lifo => write!(f, "LIFO"),
            AcquireOrder::Fifo => write!(f, "FIFO"),
        }
    }
}

impl std::str::FromStr for AcquireOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lifo" => Ok(AcquireOrder::Lifo),
            "fifo" => Ok(AcquireOrder::Fifo),
            _ => Err(format!("Unknown acquire order: {}", s)),
        }
    }
}

/// 连接池配置
///
/// 创建后与一个 [`Endpoint`](crate::registry::Endpoint) 一一绑定，之后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 最少空闲连接数（默认 0）
    pub min_idle: usize,
    /// 最多空闲连接数（默认 8）
    pub max_idle: usize,
    /// 最大连接总数，包含空闲与借出（默认 8）
    pub max_total: usize,
    /// 空闲连接取出顺序（默认 LIFO）
    pub acquire_order: AcquireOrder,
    /// 连接耗尽时是否等待（默认 true）
    pub block_when_exhausted: bool,
    /// 等待可用连接的最长时间（默认 10 秒）
    pub max_wait_millis: u64,
    /// 借出前是否校验（默认 true）
    pub validate_before_borrow: bool,
    /// 空闲侵蚀因子，`<= 0` 表示关闭（默认 -1）
    pub eroding_factor: f32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 0,
            max_idle: 8,
            max_total: 8,
            acquire_order: AcquireOrder::Lifo,
            block_when_exhausted: true,
            max_wait_millis: 10_000,
            validate_before_borrow: true,
            eroding_factor: -1.0,
        }
    }
}

impl PoolConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置最少空闲连接数
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// 设置最多空闲连接数
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// 设置最大连接总数
    pub fn with_max_total(mut self, max_total: usize) -> Self {
        self.max_total = max_total;
        self
    }

    /// 设置空闲连接取出顺序
    pub fn with_acquire_order(mut self, order: AcquireOrder) -> Self {
        self.acquire_order = order;
        self
    }

    /// 启用/禁用耗尽时等待
    pub fn with_block_when_exhausted(mut self, block: bool) -> Self {
        self.block_when_exhausted = block;
        self
    }

    /// 设置最长等待时间
    pub fn with_max_wait_millis(mut self, millis: u64) -> Self {
        self.max_wait_millis = millis;
        self
    }

    /// 启用/禁用借出前校验
    pub fn with_validate_before_borrow(mut self, validate: bool) -> Self {
        self.validate_before_borrow = validate;
        self
    }

    /// 设置空闲侵蚀因子
    pub fn with_eroding_factor(mut self, factor: f32) -> Self {
        self.eroding_factor = factor;
        self
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_millis)
    }

    pub fn erosion_enabled(&self) -> bool {
        self.eroding_factor > 0.0
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.max_total == 0 {
            return Err(RpcError::configuration("pool max_total must be at least 1"));
        }
        if self.min_idle > self.max_idle {
            return Err(RpcError::configuration(format!(
                "pool min_idle ({}) exceeds max_idle ({})",
                self.min_idle, self.max_idle
            )));
        }
        if self.eroding_factor.is_nan() {
            return Err(RpcError::configuration("pool eroding_factor is not a number"));
        }
        Ok(())
    }
}
