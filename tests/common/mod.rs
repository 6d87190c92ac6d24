//! 测试公共工具：模拟连接生命周期与日志捕获

#![allow(dead_code)]

use async_trait::async_trait;
use grpc_client_core::error::{Result, RpcError};
use grpc_client_core::pool::ConnectionLifecycle;
use grpc_client_core::registry::Endpoint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// 模拟连接
#[derive(Debug)]
pub struct MockConn {
    pub id: u64,
    /// 借出标记，用于检测同一连接被同时借出
    pub in_use: AtomicBool,
    /// 置为 false 后校验失败
    pub healthy: AtomicBool,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: AtomicU64,
    reject_validation: AtomicBool,
    fail_create: AtomicBool,
    fail_passivate: AtomicBool,
    create_delay_ms: AtomicU64,
    created: Mutex<Vec<u64>>,
    destroyed: Mutex<Vec<u64>>,
}

/// 模拟连接生命周期，克隆共享同一份状态
#[derive(Debug, Clone, Default)]
pub struct MockLifecycle {
    state: Arc<MockState>,
}

impl MockLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有连接（包括新建的）校验失败
    pub fn reject_validation(&self, reject: bool) {
        self.state.reject_validation.store(reject, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_passivate(&self, fail: bool) {
        self.state.fail_passivate.store(fail, Ordering::SeqCst);
    }

    /// 每次建立连接前等待的时间
    pub fn set_create_delay(&self, delay: Duration) {
        self.state
            .create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<u64> {
        self.state.created.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<u64> {
        self.state.destroyed.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.state.created.lock().unwrap().len()
    }

    pub fn destroyed_count(&self) -> usize {
        self.state.destroyed.lock().unwrap().len()
    }
}

#[async_trait]
impl ConnectionLifecycle for MockLifecycle {
    type Connection = MockConn;

    async fn create(&self, endpoint: &Endpoint) -> Result<MockConn> {
        let delay = self.state.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(RpcError::transport(format!(
                "connection refused: {}",
                endpoint.target()
            )));
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.created.lock().unwrap().push(id);
        Ok(MockConn {
            id,
            in_use: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
        })
    }

    async fn validate(&self, conn: &MockConn) -> bool {
        !self.state.reject_validation.load(Ordering::SeqCst) && conn.healthy.load(Ordering::SeqCst)
    }

    fn passivate(&self, _conn: &mut MockConn) -> Result<()> {
        if self.state.fail_passivate.load(Ordering::SeqCst) {
            return Err(RpcError::transport("passivate failed"));
        }
        Ok(())
    }

    fn destroy(&self, conn: MockConn) {
        self.state.destroyed.lock().unwrap().push(conn.id);
    }
}

/// 捕获到的日志事件
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
}

/// 日志捕获句柄
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// 指定消息的事件级别（按发生顺序）
    pub fn levels_of(&self, message: &str) -> Vec<Level> {
        self.events()
            .into_iter()
            .filter(|event| event.message == message)
            .map(|event| event.level)
            .collect()
    }

    pub fn count(&self, message: &str) -> usize {
        self.levels_of(message).len()
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.logs.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

/// 在当前线程安装日志捕获，guard 存活期间有效
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer { logs: logs.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

/// 测试用端点
pub fn endpoint(target_id: &str) -> Arc<Endpoint> {
    Arc::new(Endpoint::new(target_id, "127.0.0.1", 50051))
}
