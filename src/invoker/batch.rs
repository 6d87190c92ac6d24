//! 批量调用
//!
//! 同一个借出的连接上并发执行多个请求。连接借用受重试策略保护，
//! 单个请求不重试；全部完成后才返回，结果与请求一一对应。
//! 全部成功时归还连接，任一失败则作废连接。

use super::Invoker;
use crate::error::{Result, classify_call_error};
use crate::pool::ConnectionLifecycle;
use futures::future::join_all;
use std::future::Future;
use std::time::Instant;
use tracing::debug;

impl<L: ConnectionLifecycle> Invoker<L> {
    /// 在一个连接上并发执行一批请求
    ///
    /// 外层错误只来自连接借用（未知目标、连接池耗尽且重试用尽等）；
    /// 每个请求的结果在返回的列表中单独给出，顺序与 `requests` 相同。
    pub async fn call_batch<S, Q, R, SF, CF, Fut>(
        &self,
        target_id: &str,
        stub_factory: SF,
        call_logic: CF,
        requests: Vec<Q>,
    ) -> Result<Vec<Result<R>>>
    where
        SF: Fn(&L::Connection) -> S,
        CF: Fn(S, Q) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let conn = match self
            .executor
            .execute(|attempt| self.acquire(target_id, attempt))
            .await
        {
            Ok(conn) => conn,
            Err(err) => {
                self.metrics.record_call(false, started.elapsed()).await;
                return Err(err);
            }
        };

        let calls = requests
            .into_iter()
            .map(|request| call_logic(stub_factory(&conn), request));
        let results: Vec<Result<R>> = join_all(calls)
            .await
            .into_iter()
            .map(|result| result.map_err(classify_call_error))
            .collect();

        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed == 0 {
            conn.release();
        } else {
            conn.invalidate();
            debug!(
                target_id,
                failed,
                total = results.len(),
                "Batch call had failures, connection invalidated"
            );
        }

        self.metrics
            .record_call(failed == 0, started.elapsed())
            .await;
        Ok(results)
    }
}
