//! 单端点连接池

use super::config::{AcquireOrder, PoolConfig};
use super::erosion::Erosion;
use super::lifecycle::ConnectionLifecycle;
use crate::error::{Result, RpcError};
use crate::registry::Endpoint;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 连接池统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// 空闲连接数
    pub idle: usize,
    /// 借出（或正在建立）的连接数
    pub borrowed: usize,
    /// 存活连接总数
    pub total: usize,
    /// 累计创建数
    pub created: u64,
    /// 累计销毁数
    pub destroyed: u64,
    pub max_total: usize,
    pub max_idle: usize,
}

/// 单端点连接池
///
/// 借出数量由一个 `max_total` 许可的信号量约束，借出的连接持有一个许可，
/// 直到归还或作废时才释放。空闲列表与连接计数由同步锁保护，
/// 锁内从不调用生命周期钩子，也从不跨越 `.await`。
///
/// 克隆开销很小，所有克隆共享同一个池。
pub struct ConnectionPool<L: ConnectionLifecycle> {
    inner: Arc<PoolInner<L>>,
}

impl<L: ConnectionLifecycle> Clone for ConnectionPool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ConnectionLifecycle> fmt::Debug for ConnectionPool<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.inner.endpoint.target())
            .field("stats", &self.stats())
            .finish()
    }
}

struct PoolInner<L: ConnectionLifecycle> {
    endpoint: Arc<Endpoint>,
    lifecycle: Arc<L>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState<L::Connection>>,
    created: AtomicU64,
    destroyed: AtomicU64,
}

struct PoolState<C> {
    idle: VecDeque<C>,
    /// 空闲 + 借出 + 正在建立
    total: usize,
    closed: bool,
    erosion: Option<Erosion>,
}

enum Candidate<C> {
    Idle(C),
    Create,
}

impl<L: ConnectionLifecycle> ConnectionPool<L> {
    /// 为端点创建连接池，不会预先建立连接
    pub fn new(endpoint: Arc<Endpoint>, lifecycle: Arc<L>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        if config.max_total > Semaphore::MAX_PERMITS {
            return Err(RpcError::configuration(format!(
                "pool max_total {} exceeds {}",
                config.max_total,
                Semaphore::MAX_PERMITS
            )));
        }

        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
            closed: false,
            erosion: Erosion::new(config.eroding_factor, Instant::now()),
        };

        Ok(Self {
            inner: Arc::new(PoolInner {
                endpoint,
                lifecycle,
                permits: Arc::new(Semaphore::new(config.max_total)),
                config,
                state: Mutex::new(state),
                created: AtomicU64::new(0),
                destroyed: AtomicU64::new(0),
            }),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// 借出一个连接
    ///
    /// 连接耗尽时按配置等待 `max_wait_millis` 或立即失败，失败均为
    /// [`RpcError::PoolExhausted`]。开启借出前校验时，校验失败的空闲连接被销毁并换下一个；
    /// 新建连接校验失败则直接失败。
    pub async fn acquire(&self) -> Result<PooledConnection<L>> {
        let permit = self.acquire_permit().await?;
        let inner = &*self.inner;

        loop {
            let candidate = {
                let mut state = inner.state();
                if state.closed {
                    return Err(pool_closed());
                }
                let idle = match inner.config.acquire_order {
                    AcquireOrder::Lifo => state.idle.pop_back(),
                    AcquireOrder::Fifo => state.idle.pop_front(),
                };
                match idle {
                    Some(conn) => Candidate::Idle(conn),
                    None if state.total < inner.config.max_total => {
                        state.total += 1;
                        Candidate::Create
                    }
                    None => return Err(RpcError::pool_exhausted("Pool exhausted")),
                }
            };

            match candidate {
                Candidate::Idle(conn) => {
                    let slot = Slot::filled(inner, conn);
                    if !inner.config.validate_before_borrow || slot.validate().await {
                        return Ok(self.checkout(slot, permit));
                    }
                    debug!(
                        target_id = %inner.endpoint.target_id,
                        "Idle connection failed validation, destroying"
                    );
                }
                Candidate::Create => {
                    let mut slot = Slot::reserved(inner);
                    let conn = inner.lifecycle.create(&inner.endpoint).await.map_err(|err| {
                        warn!(
                            target_id = %inner.endpoint.target_id,
                            address = %inner.endpoint.target(),
                            error = %err,
                            "Failed to create connection"
                        );
                        RpcError::pool_exhausted(format!(
                            "Unable to create connection to {}: {}",
                            inner.endpoint.target(),
                            err
                        ))
                    })?;
                    inner.created.fetch_add(1, Ordering::Relaxed);
                    slot.fill(conn);

                    if inner.config.validate_before_borrow && !slot.validate().await {
                        debug!(
                            target_id = %inner.endpoint.target_id,
                            "New connection failed validation, destroying"
                        );
                        return Err(RpcError::pool_exhausted("Unable to validate object"));
                    }
                    return Ok(self.checkout(slot, permit));
                }
            }
        }
    }

    /// 归还连接
    pub fn release(&self, conn: PooledConnection<L>) {
        conn.release();
    }

    /// 作废连接
    pub fn invalidate(&self, conn: PooledConnection<L>) {
        conn.invalidate();
    }

    /// 预建空闲连接直到 `min_idle`，返回新建数量
    pub async fn prefill(&self) -> Result<usize> {
        let inner = &*self.inner;
        let mut added = 0;

        while let Ok(permit) = inner.permits.clone().try_acquire_owned() {
            {
                let mut state = inner.state();
                if state.closed {
                    return Err(pool_closed());
                }
                if state.idle.len() >= inner.config.min_idle
                    || state.total >= inner.config.max_total
                {
                    break;
                }
                state.total += 1;
            }

            let mut slot = Slot::reserved(inner);
            let conn = inner.lifecycle.create(&inner.endpoint).await.map_err(|err| {
                RpcError::pool_exhausted(format!(
                    "Unable to create connection to {}: {}",
                    inner.endpoint.target(),
                    err
                ))
            })?;
            inner.created.fetch_add(1, Ordering::Relaxed);
            slot.fill(conn);
            let parked = match slot.commit() {
                Some(conn) => inner.park_idle(conn),
                None => false,
            };
            drop(permit);
            if !parked {
                break;
            }
            added += 1;
        }

        if added > 0 {
            debug!(
                target_id = %inner.endpoint.target_id,
                added,
                "Prefilled connection pool"
            );
        }
        Ok(added)
    }

    /// 关闭连接池
    ///
    /// 销毁所有空闲连接并唤醒等待者；之后归还的连接直接销毁，借出请求失败。
    pub fn close(&self) {
        let drained: Vec<L::Connection> = {
            let mut state = self.inner.state();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };
        self.inner.permits.close();

        let count = drained.len();
        for conn in drained {
            self.inner.destroy_now(conn);
        }
        info!(
            target_id = %self.inner.endpoint.target_id,
            destroyed = count,
            "Connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state().idle.len()
    }

    pub fn total_count(&self) -> usize {
        self.inner.state().total
    }

    pub fn borrowed_count(&self) -> usize {
        let state = self.inner.state();
        state.total - state.idle.len()
    }

    /// 统计快照
    pub fn stats(&self) -> PoolStats {
        let (idle, total) = {
            let state = self.inner.state();
            (state.idle.len(), state.total)
        };
        PoolStats {
            idle,
            borrowed: total - idle,
            total,
            created: self.inner.created.load(Ordering::Relaxed),
            destroyed: self.inner.destroyed.load(Ordering::Relaxed),
            max_total: self.inner.config.max_total,
            max_idle: self.inner.config.max_idle,
        }
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let permits = Arc::clone(&self.inner.permits);
        let config = &self.inner.config;

        if !config.block_when_exhausted {
            return permits.try_acquire_owned().map_err(|err| match err {
                TryAcquireError::Closed => pool_closed(),
                TryAcquireError::NoPermits => RpcError::pool_exhausted("Pool exhausted"),
            });
        }

        match tokio::time::timeout(config.max_wait(), permits.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(pool_closed()),
            Err(_) => Err(RpcError::pool_exhausted(format!(
                "Timeout waiting for idle object, max_wait_millis={}",
                config.max_wait_millis
            ))),
        }
    }

    fn checkout(&self, slot: Slot<'_, L>, permit: OwnedSemaphorePermit) -> PooledConnection<L> {
        PooledConnection {
            pool: self.clone(),
            conn: slot.commit(),
            _permit: permit,
        }
    }
}

impl<L: ConnectionLifecycle> PoolInner<L> {
    fn state(&self) -> MutexGuard<'_, PoolState<L::Connection>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 归还流程：复位，然后视情况放回空闲列表或销毁
    fn return_connection(&self, mut conn: L::Connection) {
        if let Err(err) = self.lifecycle.passivate(&mut conn) {
            debug!(
                target_id = %self.endpoint.target_id,
                error = %err,
                "Connection failed to passivate, destroying"
            );
            self.retire(Some(conn));
            return;
        }

        let now = Instant::now();
        let mut state = self.state();
        let idle = state.idle.len();
        let eroded = state
            .erosion
            .as_mut()
            .is_some_and(|erosion| erosion.should_shrink(now, idle, self.config.min_idle));

        if state.closed || idle >= self.config.max_idle || eroded {
            state.total -= 1;
            let next_shrink = state.erosion.as_ref().map(|erosion| erosion.next_shrink());
            drop(state);
            if eroded {
                debug!(
                    target_id = %self.endpoint.target_id,
                    idle,
                    next_shrink_in_ms = next_shrink
                        .map(|at| at.saturating_duration_since(now).as_millis() as u64)
                        .unwrap_or_default(),
                    "Eroding idle connection"
                );
            }
            self.destroy_now(conn);
            return;
        }
        state.idle.push_back(conn);
    }

    /// 把新建的连接放入空闲列表
    ///
    /// 建立期间空闲列表可能已被归还或并发预建填满，此时销毁该连接并返回 false。
    fn park_idle(&self, conn: L::Connection) -> bool {
        let mut state = self.state();
        if state.closed || state.idle.len() >= self.config.max_idle {
            state.total -= 1;
            drop(state);
            self.destroy_now(conn);
            return false;
        }
        state.idle.push_back(conn);
        true
    }

    /// 放弃一个存活连接（或尚未建立的预留），计数减一
    fn retire(&self, conn: Option<L::Connection>) {
        {
            let mut state = self.state();
            state.total = state.total.saturating_sub(1);
        }
        if let Some(conn) = conn {
            self.destroy_now(conn);
        }
    }

    fn destroy_now(&self, conn: L::Connection) {
        self.lifecycle.destroy(conn);
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

fn pool_closed() -> RpcError {
    RpcError::pool_exhausted("Pool not open")
}

/// 借出流程中尚未交给调用方的连接槽位
///
/// 借出的 future 在等待建立或校验时被丢弃，槽位会归还容量并销毁已建立的连接。
struct Slot<'a, L: ConnectionLifecycle> {
    pool: &'a PoolInner<L>,
    conn: Option<L::Connection>,
    committed: bool,
}

impl<'a, L: ConnectionLifecycle> Slot<'a, L> {
    fn reserved(pool: &'a PoolInner<L>) -> Self {
        Self {
            pool,
            conn: None,
            committed: false,
        }
    }

    fn filled(pool: &'a PoolInner<L>, conn: L::Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
            committed: false,
        }
    }

    fn fill(&mut self, conn: L::Connection) {
        self.conn = Some(conn);
    }

    async fn validate(&self) -> bool {
        match &self.conn {
            Some(conn) => self.pool.lifecycle.validate(conn).await,
            None => false,
        }
    }

    fn commit(mut self) -> Option<L::Connection> {
        self.committed = true;
        self.conn.take()
    }
}

impl<L: ConnectionLifecycle> Drop for Slot<'_, L> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.retire(self.conn.take());
        }
    }
}

/// 借出的连接
///
/// 通过 `Deref` 使用底层连接。用完后调用 [`release`](Self::release) 归还，
/// 或调用 [`invalidate`](Self::invalidate) 销毁；未显式归还就被丢弃的连接按作废处理。
pub struct PooledConnection<L: ConnectionLifecycle> {
    pool: ConnectionPool<L>,
    conn: Option<L::Connection>,
    // 在连接回到空闲列表之后才释放
    _permit: OwnedSemaphorePermit,
}

impl<L: ConnectionLifecycle> PooledConnection<L> {
    /// 所属端点
    pub fn endpoint(&self) -> &Endpoint {
        self.pool.endpoint()
    }

    /// 归还到连接池
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.inner.return_connection(conn);
        }
    }

    /// 作废并销毁
    pub fn invalidate(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.inner.retire(Some(conn));
        }
    }
}

impl<L: ConnectionLifecycle> Deref for PooledConnection<L> {
    type Target = L::Connection;

    fn deref(&self) -> &Self::Target {
        // 只有 release / invalidate 会取走连接，二者都消耗 self
        self.conn.as_ref().expect("pooled connection already returned")
    }
}

impl<L: ConnectionLifecycle> DerefMut for PooledConnection<L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already returned")
    }
}

impl<L: ConnectionLifecycle> Drop for PooledConnection<L> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!(
                target_id = %self.pool.inner.endpoint.target_id,
                "Connection dropped without release, invalidating"
            );
            self.pool.inner.retire(Some(conn));
        }
    }
}

impl<L: ConnectionLifecycle> fmt::Debug for PooledConnection<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("target", &self.pool.inner.endpoint.target())
            .finish()
    }
}
