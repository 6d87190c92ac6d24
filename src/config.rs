//! 配置模块
//!
//! 支持从 TOML 文件或宿主阶段提供的扁平键值（`GRPC_*`）加载

use crate::client::TransportConfig;
use crate::error::{Result, RpcError};
use crate::pool::PoolConfig;
use crate::retry::RetryPolicy;
use crate::telemetry::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

const HOST_PREFIX: &str = "GRPC_HOST_";
const PORT_PREFIX: &str = "GRPC_PORT_";

/// gRPC 调用层配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    /// 目标 ID → 主机
    pub hosts: BTreeMap<String, String>,
    /// 目标 ID → 端口
    pub ports: BTreeMap<String, u16>,
    /// 所有目标共用的连接池配置
    pub pool: PoolConfig,
    /// 重试配置
    pub retry: RetryPolicy,
    /// 传输层配置
    pub transport: TransportConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl GrpcConfig {
    /// 从 TOML 文件加载
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RpcError::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: GrpcConfig = toml::from_str(&content).map_err(|e| {
            RpcError::configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// 从扁平键值加载
    ///
    /// 识别 `GRPC_HOST_<id>`、`GRPC_PORT_<id>` 与 `GRPC_POOL_*`、`GRPC_RETRY_*`、
    /// 传输层相关键；其他键属于宿主阶段，直接忽略。
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = GrpcConfig::default();
        for (key, value) in entries {
            config.apply_entry(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// 从进程环境变量加载
    pub fn from_env() -> Result<Self> {
        Self::from_entries(std::env::vars())
    }

    fn apply_entry(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(target_id) = key.strip_prefix(HOST_PREFIX) {
            self.hosts
                .insert(target_id.to_string(), value.trim().to_string());
            return Ok(());
        }
        if let Some(target_id) = key.strip_prefix(PORT_PREFIX) {
            self.ports
                .insert(target_id.to_string(), parse_value(key, value)?);
            return Ok(());
        }

        match key {
            "GRPC_POOL_MIN_IDLE_CONNECTIONS" => self.pool.min_idle = parse_value(key, value)?,
            "GRPC_POOL_MAX_IDLE_CONNECTIONS" => self.pool.max_idle = parse_value(key, value)?,
            "GRPC_POOL_MAX_SIZE" => self.pool.max_total = parse_value(key, value)?,
            "GRPC_POOL_RETRIEVAL_ORDER" => self.pool.acquire_order = parse_value(key, value)?,
            "GRPC_POOL_BLOCK_EXHAUSTED" => self.pool.block_when_exhausted = parse_bool(key, value)?,
            "GRPC_POOL_MAX_BORROW_WAIT_MILLIS" => {
                self.pool.max_wait_millis = parse_value(key, value)?
            }
            "GRPC_POOL_TEST_BEFORE_BORROW" => {
                self.pool.validate_before_borrow = parse_bool(key, value)?
            }
            "GRPC_POOL_ERODING_FACTOR" => self.pool.eroding_factor = parse_value(key, value)?,
            "GRPC_RETRY_MAX_ATTEMPTS" => self.retry.max_attempts = parse_value(key, value)?,
            "GRPC_RETRY_INITIAL_WAIT_MILLIS" => {
                self.retry.initial_wait_millis = parse_value(key, value)?
            }
            "GRPC_RETRY_MULTIPLIER" => self.retry.multiplier = parse_value(key, value)?,
            "GRPC_RETRY_NUM_FAILS_BEFORE_WARN" => {
                self.retry.fails_before_warn = parse_value(key, value)?
            }
            "GRPC_RETRY_MAX_WAIT_MILLIS" => {
                self.retry.max_wait_millis = Some(parse_value(key, value)?)
            }
            "GRPC_KEEP_ALIVE_MILLIS" => self.transport.keep_alive_millis = parse_value(key, value)?,
            "GRPC_KEEP_ALIVE_TIMEOUT_MILLIS" => {
                self.transport.keep_alive_timeout_millis = parse_value(key, value)?
            }
            "GRPC_KEEP_ALIVE_WITHOUT_CALLS" => {
                self.transport.keep_alive_without_calls = parse_bool(key, value)?
            }
            "GRPC_LOAD_BALANCING_POLICY" => {
                self.transport.load_balancing_policy = parse_value(key, value)?
            }
            "GRPC_MAX_INBOUND_MESSAGE_BYTE_SIZE" => {
                self.transport.max_inbound_message_bytes = parse_value(key, value)?
            }
            "GRPC_MAX_INBOUND_METADATA_BYTE_SIZE" => {
                self.transport.max_inbound_metadata_bytes = parse_value(key, value)?
            }
            _ => {}
        }
        Ok(())
    }

    /// 设置一个目标
    pub fn with_target(mut self, target_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let target_id = target_id.into();
        self.hosts.insert(target_id.clone(), host.into());
        self.ports.insert(target_id, port);
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// 校验配置
    ///
    /// 主机与端口两组目标 ID 必须完全一致，且至少配置一个目标。
    pub fn validate(&self) -> Result<()> {
        let host_ids: BTreeSet<&String> = self.hosts.keys().collect();
        let port_ids: BTreeSet<&String> = self.ports.keys().collect();

        if host_ids != port_ids {
            let missing_ports: Vec<&str> = host_ids
                .difference(&port_ids)
                .map(|id| id.as_str())
                .collect();
            let missing_hosts: Vec<&str> = port_ids
                .difference(&host_ids)
                .map(|id| id.as_str())
                .collect();
            return Err(RpcError::configuration(format!(
                "gRPC hosts and ports do not match (missing ports: {:?}, missing hosts: {:?})",
                missing_ports, missing_hosts
            )));
        }
        if host_ids.is_empty() {
            return Err(RpcError::configuration("No gRPC targets configured"));
        }

        self.pool.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| RpcError::configuration(format!("invalid value {:?} for {}: {}", value, key, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    parse_value(key, &value.trim().to_lowercase())
}
