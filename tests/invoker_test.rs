//! 远程调用编排测试

mod common;

use common::{MockConn, MockLifecycle, capture_logs};
use grpc_client_core::error::{ErrorKind, RpcError};
use grpc_client_core::pool::PoolConfig;
use grpc_client_core::registry::EndpointRegistry;
use grpc_client_core::retry::RetryPolicy;
use grpc_client_core::{GrpcConfig, Invoker};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tonic::{Code, Status};

const RETRYING: &str = "gRPC call attempt failed, retrying";

#[derive(Debug, thiserror::Error)]
#[error("extractor rejected document {0}")]
struct ExtractorError(u32);

fn invoker_with(pool: PoolConfig, retry: RetryPolicy) -> (Invoker<MockLifecycle>, MockLifecycle) {
    let lifecycle = MockLifecycle::new();
    let mut registry = EndpointRegistry::new(lifecycle.clone());
    registry.register("ocr", "ocr.internal", 9000, pool.clone()).unwrap();
    registry.register("nlp", "nlp.internal", 9001, pool).unwrap();
    let invoker = Invoker::new("extract-stage", registry, retry).unwrap();
    (invoker, lifecycle)
}

fn default_invoker() -> (Invoker<MockLifecycle>, MockLifecycle) {
    invoker_with(PoolConfig::default(), RetryPolicy::default())
}

fn stub(conn: &MockConn) -> u64 {
    conn.id
}

/// 测试：成功调用返回响应并归还连接
#[tokio::test]
async fn test_call_success_releases_connection() {
    let (invoker, lifecycle) = default_invoker();

    let response = invoker
        .call(
            "ocr",
            stub,
            |conn_id, request: String| async move {
                Ok::<_, anyhow::Error>(format!("{request} via {conn_id}"))
            },
            "page-1".to_string(),
        )
        .await
        .unwrap();

    assert_eq!(response, "page-1 via 1");
    let stats = invoker.pool_stats("ocr").unwrap();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.borrowed, 0);
    assert_eq!(lifecycle.destroyed_count(), 0);
}

/// 测试：服务不可用时作废连接并重试，直到成功
#[tokio::test(start_paused = true)]
async fn test_retryable_status_is_retried() {
    let (invoker, lifecycle) = default_invoker();
    let calls = AtomicU32::new(0);

    let response = invoker
        .call(
            "ocr",
            stub,
            |conn_id, request: u32| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(anyhow::Error::from(Status::unavailable("restarting")))
                    } else {
                        Ok((request, conn_id))
                    }
                }
            },
            7,
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 前两次失败的连接被作废，第三次使用新连接
    assert_eq!(response, (7, 3));
    assert_eq!(lifecycle.destroyed(), vec![1, 2]);

    let metrics = invoker.metrics().snapshot().await;
    assert_eq!(metrics.calls_total, 1);
    assert_eq!(metrics.calls_succeeded, 1);
    assert_eq!(metrics.attempts_total, 3);
    assert_eq!(metrics.retries_total, 2);
}

/// 测试：不可重试的状态立即返回服务错误，不再重试
#[tokio::test(start_paused = true)]
async fn test_terminal_status_not_retried() {
    let (invoker, lifecycle) = default_invoker();
    let calls = AtomicU32::new(0);

    let err = invoker
        .call(
            "nlp",
            stub,
            |_, _: ()| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow::Error::from(Status::invalid_argument("bad page"))) }
            },
            (),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(err.code(), Some(Code::InvalidArgument));
    assert_eq!(lifecycle.destroyed(), vec![1]);
    assert_eq!(invoker.pool_stats("nlp").unwrap().total, 0);
}

/// 测试：调用逻辑的其他错误原样返回，连接作废，不重试
#[tokio::test(start_paused = true)]
async fn test_arbitrary_error_propagates_unchanged() {
    let (invoker, lifecycle) = default_invoker();
    let calls = AtomicU32::new(0);

    let err = invoker
        .call(
            "ocr",
            stub,
            |_, doc: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(anyhow::Error::new(ExtractorError(doc))) }
            },
            42,
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.kind(), ErrorKind::Call);
    assert_eq!(err.to_string(), "extractor rejected document 42");
    let original = err
        .as_call_error()
        .and_then(|err| err.downcast_ref::<ExtractorError>())
        .unwrap();
    assert_eq!(original.0, 42);
    assert_eq!(lifecycle.destroyed_count(), 1);
}

/// 测试：连接池持续耗尽时重试用尽，返回连接池耗尽错误
#[tokio::test(start_paused = true)]
async fn test_pool_exhaustion_retried_until_exhausted() {
    let (logs, _guard) = capture_logs();
    let pool = PoolConfig::default()
        .with_max_total(1)
        .with_block_when_exhausted(false);
    let (invoker, _) = invoker_with(pool, RetryPolicy::default());
    let held = invoker.registry().pool_for("ocr").unwrap().acquire().await.unwrap();

    let started = tokio::time::Instant::now();
    let err = invoker
        .call("ocr", stub, |_, _: ()| async { Ok::<_, anyhow::Error>(()) }, ())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PoolExhausted);
    assert!(started.elapsed() >= Duration::from_millis(64 + 128 + 256));
    assert_eq!(logs.count(RETRYING), 3);

    let metrics = invoker.metrics().snapshot().await;
    assert_eq!(metrics.attempts_total, 4);
    assert_eq!(metrics.calls_failed, 1);
    held.release();
}

/// 测试：未注册的目标不重试
#[tokio::test]
async fn test_unknown_target() {
    let (invoker, _) = default_invoker();

    let err = invoker
        .call("translate", stub, |_, _: ()| async { Ok::<_, anyhow::Error>(()) }, ())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownTarget);
    assert_eq!(err.to_string(), "Target-ID translate was never configured");
    assert_eq!(invoker.metrics().snapshot().await.attempts_total, 1);
}

/// 测试：请求在每次尝试时重新发送
#[tokio::test(start_paused = true)]
async fn test_request_resent_on_every_attempt() {
    let (invoker, _) = default_invoker();
    let seen = std::sync::Mutex::new(Vec::new());

    let result = invoker
        .call(
            "ocr",
            stub,
            |_, request: Vec<u8>| {
                seen.lock().unwrap().push(request.clone());
                async { Err::<(), _>(anyhow::Error::from(Status::resource_exhausted("busy"))) }
            },
            vec![1, 2, 3],
        )
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2, 3]; 4]);
}

/// 测试：批量调用全部成功时按顺序返回并归还连接
#[tokio::test]
async fn test_batch_all_succeed() {
    let (invoker, lifecycle) = default_invoker();

    let results = invoker
        .call_batch(
            "ocr",
            stub,
            |conn_id, page: u32| async move {
                tokio::time::sleep(Duration::from_millis(u64::from(10 - page))).await;
                Ok::<_, anyhow::Error>((conn_id, page * 2))
            },
            vec![1, 2, 3, 4],
        )
        .await
        .unwrap();

    let values: Vec<(u64, u32)> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec![(1, 2), (1, 4), (1, 6), (1, 8)]);
    assert_eq!(invoker.pool_stats("ocr").unwrap().idle, 1);
    assert_eq!(lifecycle.created_count(), 1);
}

/// 测试：批量调用部分失败时收集全部结果并作废连接
#[tokio::test]
async fn test_batch_partial_failure() {
    let (invoker, lifecycle) = default_invoker();

    let results = invoker
        .call_batch(
            "nlp",
            stub,
            |_, page: u32| async move {
                match page {
                    2 => Err(anyhow::Error::from(Status::unavailable("down"))),
                    3 => Err(anyhow::Error::new(ExtractorError(page))),
                    _ => Ok(page),
                }
            },
            vec![1, 2, 3, 4],
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(*results[0].as_ref().unwrap(), 1);
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(results[2].as_ref().unwrap_err().kind(), ErrorKind::Call);
    assert_eq!(*results[3].as_ref().unwrap(), 4);
    assert_eq!(lifecycle.destroyed(), vec![1]);

    let metrics = invoker.metrics().snapshot().await;
    assert_eq!(metrics.calls_failed, 1);
}

/// 测试：空批量不借用连接
#[tokio::test]
async fn test_batch_empty() {
    let (invoker, lifecycle) = default_invoker();

    let results = invoker
        .call_batch("ocr", stub, |_, _: u32| async { Ok::<_, anyhow::Error>(()) }, Vec::new())
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(lifecycle.created_count(), 0);
}

/// 测试：批量调用的连接借用受重试保护
#[tokio::test(start_paused = true)]
async fn test_batch_acquire_retried() {
    let pool = PoolConfig::default()
        .with_max_total(1)
        .with_block_when_exhausted(false);
    let (invoker, _) = invoker_with(pool, RetryPolicy::default());
    let held = invoker.registry().pool_for("ocr").unwrap().acquire().await.unwrap();

    let releaser = async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        held.release();
    };
    let batch = invoker.call_batch("ocr", stub, |id, _: ()| async move { Ok::<_, anyhow::Error>(id) }, vec![(), ()]);
    let (results, ()) = tokio::join!(batch, releaser);

    let ids: Vec<u64> = results.unwrap().into_iter().map(Result::unwrap).collect();
    assert_eq!(ids, vec![1, 1]);
    assert_eq!(invoker.metrics().snapshot().await.attempts_total, 3);
}

/// 测试：关闭编排器会中止退避等待并关闭所有连接池
#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_retries() {
    let retry = RetryPolicy::new().with_initial_wait_millis(60_000);
    let (invoker, lifecycle) = invoker_with(PoolConfig::default().with_min_idle(1), retry);
    assert_eq!(invoker.prefill().await.unwrap(), 2);

    let call = invoker.call(
        "ocr",
        stub,
        |_, _: ()| async { Err::<(), _>(anyhow::Error::from(Status::unavailable("down"))) },
        (),
    );
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        invoker.shutdown();
    };
    let (result, ()) = tokio::join!(call, stopper);

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
    assert!(invoker.is_shutdown());
    assert!(invoker.registry().pool_for("ocr").unwrap().is_closed());
    assert_eq!(lifecycle.created_count(), lifecycle.destroyed_count());
}

/// 测试：目标信息查询
#[tokio::test]
async fn test_target_introspection() {
    let (invoker, _) = default_invoker();

    assert_eq!(invoker.host("ocr").unwrap(), "ocr.internal");
    assert_eq!(invoker.port("nlp").unwrap(), 9001);
    assert_eq!(invoker.target("ocr").unwrap(), "ocr.internal:9000");
    assert_eq!(invoker.target_ids(), vec!["nlp", "ocr"]);
    assert_eq!(invoker.retry_policy().max_attempts, 4);
    assert_eq!(invoker.executor().name(), "extract-stage");
    assert!(matches!(
        invoker.host("missing"),
        Err(RpcError::UnknownTarget(id)) if id == "missing"
    ));
}

/// 测试：从配置创建编排器
#[tokio::test]
async fn test_invoker_from_config() {
    let config = GrpcConfig::default()
        .with_target("ocr", "10.0.0.5", 7000)
        .with_retry(RetryPolicy::new().with_max_attempts(2));
    let invoker = Invoker::from_config("stage", &config, MockLifecycle::new()).unwrap();

    assert_eq!(invoker.target("ocr").unwrap(), "10.0.0.5:7000");
    assert_eq!(invoker.retry_policy().max_attempts, 2);

    let err = Invoker::from_config("stage", &GrpcConfig::default(), MockLifecycle::new())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

/// 测试：max_total 为 1 时第二个并发调用等待第一个归还连接
#[tokio::test(start_paused = true)]
async fn test_single_connection_serializes_concurrent_calls() {
    let (invoker, lifecycle) = invoker_with(
        PoolConfig::default().with_max_total(1),
        RetryPolicy::default(),
    );
    let slow_call = |conn_id: u64, request: u32| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, anyhow::Error>((request, conn_id))
    };

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        invoker.call("ocr", stub, slow_call, 1),
        invoker.call("ocr", stub, slow_call, 2),
    );

    assert_eq!(first.unwrap(), (1, 1));
    assert_eq!(second.unwrap(), (2, 1));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(lifecycle.created_count(), 1);
}

/// 测试：前三次不可用、第四次成功时只记录三次重试日志
#[tokio::test(start_paused = true)]
async fn test_three_retry_events_before_success() {
    let (invoker, _lifecycle) = invoker_with(
        PoolConfig::default(),
        RetryPolicy::default().with_max_attempts(5),
    );
    let (logs, _guard) = capture_logs();
    let calls = AtomicU32::new(0);

    let response = invoker
        .call(
            "nlp",
            stub,
            |_conn_id, request: &'static str| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 3 {
                        Err(anyhow::Error::from(Status::unavailable("warming up")))
                    } else {
                        Ok(request.len())
                    }
                }
            },
            "tokens",
        )
        .await
        .unwrap();

    assert_eq!(response, 6);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(logs.count(RETRYING), 3);
}
