//! 远程调用目标端点

use serde::{Deserialize, Serialize};
use std::fmt;

/// 远程调用目标端点
///
/// 由目标 ID 唯一标识，创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// 目标 ID
    pub target_id: String,
    /// 主机名或 IP
    pub host: String,
    /// 端口
    pub port: u16,
}

impl Endpoint {
    pub fn new(target_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            target_id: target_id.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port` 形式的地址
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 明文 HTTP/2 连接使用的 URI
    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{})", self.target_id, self.host, self.port)
    }
}
