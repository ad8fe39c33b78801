// ワーカープールの統合テスト

use crate::fixtures::{echo_processor, string_items, ConcurrencyGauge};
use stagepool::{
    CancellationToken, ErrorCode, ProcessingItem, ProcessingState, WorkerPool, WorkerPoolConfig,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_ten_items_two_workers() {
    let pool = WorkerPool::new(echo_processor(Duration::from_millis(10)), 2);

    let result = pool
        .process(&CancellationToken::new(), string_items(10))
        .await
        .unwrap();

    assert_eq!(result.total_items, 10);
    assert_eq!(result.successful_items, 10);
    assert_eq!(result.failed_items, 0);
    assert_eq!(result.results.len(), 10);
    assert!(result.average_item_time >= Duration::from_millis(10));

    let first = &result.results[0];
    let output = first.output.as_ref().unwrap();
    assert_eq!(output["processed"], first.item.id.as_str());
    assert_eq!(output["data"], first.item.data.as_str());
}

#[tokio::test]
async fn test_counts_are_consistent_for_any_worker_count() {
    for worker_count in [1, 2, 3, 8, 32] {
        let pool = WorkerPool::new(
            |_token: CancellationToken, item: Arc<ProcessingItem<String>>| async move {
                anyhow::ensure!(!item.id.ends_with('7'), "7で終わるIDは失敗");
                Ok(item.data.len())
            },
            worker_count,
        );

        let result = pool
            .process(&CancellationToken::new(), string_items(25))
            .await
            .unwrap();

        assert_eq!(result.total_items, 25, "worker_count={worker_count}");
        assert_eq!(result.successful_items + result.failed_items, result.total_items);
        assert_eq!(result.failed_items, 2);
    }
}

#[tokio::test]
async fn test_worker_count_bounds_concurrency() {
    let gauge = ConcurrencyGauge::default();
    let pool = WorkerPool::new(gauge.clone(), 3);

    let result = pool
        .process(&CancellationToken::new(), string_items(30))
        .await
        .unwrap();

    assert_eq!(result.successful_items, 30);
    assert!(gauge.peak() <= 3);
    assert!(gauge.peak() >= 1);
}

#[tokio::test]
async fn test_cancellation_shortly_after_start() {
    let pool = WorkerPool::new(echo_processor(Duration::from_millis(50)), 2);
    let token = CancellationToken::new();
    token.cancel_after(Duration::from_millis(20));

    let outcome = pool.process(&token, string_items(10)).await;

    // 返り値がエラー・失敗件数あり・投入打ち切りのいずれかであればよい
    let accepted = match &outcome {
        Err(error) => error.is_cancelled(),
        Ok(result) => result.failed_items > 0 || result.total_items < 10,
    };
    assert!(accepted);

    if let Err(error) = outcome {
        let partial = error.into_partial().unwrap();
        assert_eq!(partial.successful_items + partial.failed_items, partial.total_items);
        assert!(partial.total_items <= 10);
    }
    assert_eq!(pool.status().state, ProcessingState::Cancelled);
}

#[tokio::test]
async fn test_panicking_item_does_not_stop_pool() {
    let pool = WorkerPool::new(
        |_token: CancellationToken, item: Arc<ProcessingItem<String>>| async move {
            if item.id == "item-3" {
                panic!("処理関数のパニック");
            }
            Ok::<_, anyhow::Error>(())
        },
        2,
    );

    let result = pool
        .process(&CancellationToken::new(), string_items(6))
        .await
        .unwrap();

    assert_eq!(result.total_items, 6);
    assert_eq!(result.failed_items, 1);
    assert!(result.errors[0].starts_with("item-3: "));
}

#[tokio::test]
async fn test_pool_is_reusable_between_runs() {
    let pool = WorkerPool::with_config(
        echo_processor(Duration::ZERO),
        &WorkerPoolConfig::new(4).with_batch_size(3),
    );

    let first = pool.process(&CancellationToken::new(), string_items(5)).await.unwrap();
    let second = pool.process(&CancellationToken::new(), string_items(8)).await.unwrap();

    assert_eq!(first.total_items, 5);
    assert_eq!(second.total_items, 8);
    assert_eq!(pool.status().processed_items, 8);
    assert_eq!(pool.status().total_items, 8);
}

#[tokio::test]
async fn test_invalid_batch_size_rejected_before_work() {
    let pool = WorkerPool::with_config(
        echo_processor(Duration::ZERO),
        &WorkerPoolConfig::new(2).with_batch_size(0),
    );

    let error = pool
        .process(&CancellationToken::new(), string_items(3))
        .await
        .unwrap_err();

    assert_eq!(error.error().code, ErrorCode::Configuration);
    assert!(error.partial().is_none());
}
