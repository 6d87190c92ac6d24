//! 连接生命周期钩子

use crate::error::Result;
use crate::registry::Endpoint;
use async_trait::async_trait;

/// 连接生命周期
///
/// 连接池通过这组钩子创建、校验、复位和销毁连接。
/// 所有钩子都在池锁之外调用，实现可以自由执行 I/O。
#[async_trait]
pub trait ConnectionLifecycle: Send + Sync + 'static {
    /// 池化的连接类型
    type Connection: Send + Sync + 'static;

    /// 为端点建立一个新连接
    async fn create(&self, endpoint: &Endpoint) -> Result<Self::Connection>;

    /// 判断连接是否仍可用
    async fn validate(&self, _conn: &Self::Connection) -> bool {
        true
    }

    /// 连接归还到空闲列表前的复位，失败的连接会被销毁
    fn passivate(&self, _conn: &mut Self::Connection) -> Result<()> {
        Ok(())
    }

    /// 释放连接占用的资源，对每个连接只调用一次
    fn destroy(&self, conn: Self::Connection);
}
