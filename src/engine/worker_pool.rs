// WorkerPool - 固定数ワーカーによる並列処理エンジン
// Producer → タスクキュー → Consumers → 結果キュー → Collector の構成

use super::collector::spawn_result_collector;
use super::consumer::{spawn_consumers, TASK_CANCELLED_MESSAGE};
use super::producer::spawn_producer;
use super::status::LatestStatus;
use crate::core::cancellation::CancelOnDrop;
use crate::core::{
    CancellationToken, ConcurrentResult, ConcurrentStatus, ItemProcessor, ProcessingError,
    ProcessingItem, ProcessingState, RunError,
};
use crate::services::config::WorkerPoolConfig;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 固定数のワーカーでアイテムを並列処理するエグゼキュータ
///
/// 処理関数は`ItemProcessor`として注入する。`status()`は実行中でも
/// 別タスクから呼び出せ、直近の実行のスナップショットを返す。
pub struct WorkerPool<P, D, O> {
    processor: Arc<P>,
    worker_count: AtomicUsize,
    batch_size: AtomicUsize,
    status: LatestStatus,
    _payload: PhantomData<fn(D) -> O>,
}

impl<P, D, O> WorkerPool<P, D, O>
where
    P: ItemProcessor<D, O> + 'static,
    D: Send + Sync + 'static,
    O: Send + 'static,
{
    /// 新しいワーカープールを作成
    pub fn new(processor: P, worker_count: usize) -> Self {
        Self::with_config(processor, &WorkerPoolConfig::new(worker_count))
    }

    pub fn with_config(processor: P, config: &WorkerPoolConfig) -> Self {
        Self {
            processor: Arc::new(processor),
            worker_count: AtomicUsize::new(config.worker_count),
            batch_size: AtomicUsize::new(config.batch_size),
            status: LatestStatus::new(),
            _payload: PhantomData,
        }
    }

    /// 次回以降の実行で使用するワーカー数を設定
    pub fn set_worker_count(&self, worker_count: usize) {
        self.worker_count.store(worker_count, Ordering::Release);
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    /// 結果集計のまとまりを設定（集計結果には影響しない）
    pub fn set_batch_size(&self, batch_size: usize) {
        self.batch_size.store(batch_size, Ordering::Release);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::Acquire)
    }

    pub fn config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.worker_count()).with_batch_size(self.batch_size())
    }

    /// 直近の実行状態のスナップショットを取得
    ///
    /// 同じプールで実行が重なった場合は、最後に開始した実行の状態を返す。
    pub fn status(&self) -> ConcurrentStatus {
        self.status.snapshot()
    }

    /// アイテムリストを並列処理
    ///
    /// 個々のアイテムの失敗は結果に記録され、エラーとしては返らない。
    /// `Err`になるのは設定エラー（処理開始前）とキャンセル（部分結果付き）のみ。
    /// キャンセル時は投入が途中で止まるため、`total_items`がアイテム数より少ないことがある。
    pub async fn process(
        &self,
        token: &CancellationToken,
        items: Vec<ProcessingItem<D>>,
    ) -> Result<ConcurrentResult<D, O>, RunError<ConcurrentResult<D, O>>> {
        let config = self.config();
        config.validate()?;

        let worker_count = config.worker_count;
        let supplied = items.len();
        let started = Instant::now();
        // 途中で破棄されても状態が終了するよう、ガードで実行を保持する
        let run = self.status.begin(supplied);
        let tracker = Arc::clone(run.tracker());
        debug!(supplied, worker_count, "worker pool started");

        // 呼び出し側がこのFutureを破棄しても残りのタスクが速やかに終わるようにする
        let run_token = token.child_token();
        let _cancel_guard = CancelOnDrop(run_token.clone());

        let (task_tx, task_rx) = mpsc::channel(config.queue_capacity());
        let (result_tx, result_rx) = mpsc::channel(config.queue_capacity());

        let producer = spawn_producer(items, task_tx, run_token.clone(), Arc::clone(&tracker));
        let workers = spawn_consumers(
            worker_count,
            Arc::clone(&self.processor),
            task_rx,
            result_tx,
            Arc::clone(&tracker),
        );
        let collector = spawn_result_collector(result_rx, tracker, config.batch_size);

        let queued = producer.await.unwrap_or_else(|e| {
            warn!(error = %e, "producer task failed");
            0
        });

        // 全ワーカーの終了で結果キューが閉じ、Collectorが終わる
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker task failed");
            }
        }
        let results = collector
            .await
            .map_err(|e| RunError::Rejected(ProcessingError::task(e)))?;

        let mut summary = ConcurrentResult::from_results(results, started.elapsed(), worker_count);
        let cancelled_items = summary
            .results
            .iter()
            .filter(|result| result.error.as_deref() == Some(TASK_CANCELLED_MESSAGE))
            .count();
        summary.statistics.extend([
            ("supplied_items".to_string(), supplied as u64),
            ("queued_items".to_string(), queued as u64),
            ("total_items".to_string(), summary.total_items as u64),
            ("successful_items".to_string(), summary.successful_items as u64),
            ("failed_items".to_string(), summary.failed_items as u64),
            ("cancelled_items".to_string(), cancelled_items as u64),
            ("worker_count".to_string(), worker_count as u64),
            ("batch_size".to_string(), config.batch_size as u64),
        ]);

        if token.is_cancelled() {
            run.finish(ProcessingState::Cancelled);
            warn!(
                supplied,
                processed = summary.total_items,
                failed = summary.failed_items,
                "worker pool cancelled"
            );
            return Err(RunError::interrupted(
                summary,
                ProcessingError::cancelled("worker_pool.process"),
            ));
        }

        run.finish(ProcessingState::Completed);
        info!(
            total = summary.total_items,
            successful = summary.successful_items,
            failed = summary.failed_items,
            elapsed_ms = summary.duration.as_millis() as u64,
            "worker pool completed"
        );
        Ok(summary)
    }
}
