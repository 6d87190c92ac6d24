//! 日志初始化
//!
//! 库本身只通过 `tracing` 宏输出日志，宿主进程按需调用 [`init_tracing`] 安装订阅者。

use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认级别（默认 info），`RUST_LOG` 优先
    pub level: String,
    /// 按模块覆盖的级别，例如 `grpc_client_core::retry = "debug"`
    pub filters: BTreeMap<String, String>,
    /// 是否输出 JSON 行
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filters: BTreeMap::new(),
            json: false,
        }
    }
}

/// 安装全局日志订阅者
///
/// 已经安装过订阅者时返回配置错误。
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };

    installed.map_err(|e| RpcError::configuration(format!("failed to install tracing subscriber: {}", e)))
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let level: LevelFilter = config.level.parse().map_err(|e| {
        RpcError::configuration(format!("invalid log level {:?}: {}", config.level, e))
    })?;

    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    for (module, level) in &config.filters {
        let directive: Directive = format!("{module}={level}").parse().map_err(|e| {
            RpcError::configuration(format!("invalid log filter {module}={level}: {e}"))
        })?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}
