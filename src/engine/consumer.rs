// Consumer - 並列ワーカー機能

use super::producer::WorkTask;
use super::status::StatusTracker;
use crate::core::{ItemProcessor, TaskResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

pub(crate) const TASK_CANCELLED_MESSAGE: &str = "処理開始前にタスクがキャンセルされました";

/// 単一Consumerワーカー
///
/// キューが閉じられて空になるまでタスクを取り出し、1タスクにつき必ず1件の結果を送る。
fn spawn_single_consumer<P, D, O>(
    worker_id: usize,
    processor: Arc<P>,
    task_rx: Arc<Mutex<mpsc::Receiver<WorkTask<D>>>>,
    result_tx: mpsc::Sender<TaskResult<D, O>>,
    status: Arc<StatusTracker>,
) -> JoinHandle<()>
where
    P: ItemProcessor<D, O> + 'static,
    D: Send + Sync + 'static,
    O: Send + 'static,
{
    tokio::spawn(async move {
        loop {
            // 次のタスクを取得
            let task = {
                let mut rx = task_rx.lock().await;
                rx.recv().await
            };
            let Some(task) = task else {
                break; // キュー終了
            };
            status.item_dequeued();

            status.worker_busy();
            let result = run_task(worker_id, &processor, task).await;
            status.worker_idle();

            if result_tx.send(result).await.is_err() {
                // 結果チャンネルが閉じられた場合は終了
                break;
            }
        }
        debug!(worker_id, "worker exited");
    })
}

/// タスク1件を実行して結果に変換
///
/// 処理本体は別タスクで実行し、パニックしても失敗結果として記録する。
async fn run_task<P, D, O>(worker_id: usize, processor: &Arc<P>, task: WorkTask<D>) -> TaskResult<D, O>
where
    P: ItemProcessor<D, O> + 'static,
    D: Send + Sync + 'static,
    O: Send + 'static,
{
    let started = Instant::now();
    if task.token.is_cancelled() {
        return TaskResult::failed(task.item, TASK_CANCELLED_MESSAGE, started.elapsed(), worker_id);
    }

    let processor = Arc::clone(processor);
    let item = Arc::clone(&task.item);
    let token = task.token;
    let outcome = tokio::spawn(async move { processor.process(token, item).await }).await;

    match outcome {
        Ok(Ok(output)) => TaskResult::succeeded(task.item, output, started.elapsed(), worker_id),
        Ok(Err(error)) => TaskResult::failed(task.item, format!("{error:#}"), started.elapsed(), worker_id),
        Err(join_error) if join_error.is_panic() => TaskResult::failed(
            task.item,
            "処理関数がパニックしました",
            started.elapsed(),
            worker_id,
        ),
        Err(join_error) => TaskResult::failed(task.item, join_error.to_string(), started.elapsed(), worker_id),
    }
}

/// Consumers: 並列ワーカープール
pub(crate) fn spawn_consumers<P, D, O>(
    worker_count: usize,
    processor: Arc<P>,
    task_rx: mpsc::Receiver<WorkTask<D>>,
    result_tx: mpsc::Sender<TaskResult<D, O>>,
    status: Arc<StatusTracker>,
) -> Vec<JoinHandle<()>>
where
    P: ItemProcessor<D, O> + 'static,
    D: Send + Sync + 'static,
    O: Send + 'static,
{
    let task_rx = Arc::new(Mutex::new(task_rx));

    (0..worker_count)
        .map(|worker_id| {
            spawn_single_consumer(
                worker_id,
                Arc::clone(&processor),
                Arc::clone(&task_rx),
                result_tx.clone(),
                Arc::clone(&status),
            )
        })
        .collect()
    // 元のresult_txはここでドロップされ、全ワーカー終了時に結果チャンネルが閉じる
}
