// Collector - 結果収集機能

use super::status::StatusTracker;
use crate::core::TaskResult;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Collector: 結果キューを空になるまで読み出し、到着順のリストを返す
///
/// 結果1件ごとにステータスのカウンタを更新するため、`status()`は投入状況に関係なく
/// 実際に完了した処理と常に一致する。`batch_size`件ごとに他タスクへ実行を譲る。
pub(crate) fn spawn_result_collector<D, O>(
    mut result_rx: mpsc::Receiver<TaskResult<D, O>>,
    status: Arc<StatusTracker>,
    batch_size: usize,
) -> JoinHandle<Vec<TaskResult<D, O>>>
where
    D: Send + Sync + 'static,
    O: Send + 'static,
{
    let batch_size = batch_size.max(1);

    tokio::spawn(async move {
        let mut results = Vec::new();

        while let Some(result) = result_rx.recv().await {
            status.record(result.success);
            results.push(result);

            if results.len() % batch_size == 0 {
                debug!(collected = results.len(), "result batch collected");
                tokio::task::yield_now().await;
            }
        }

        results
    })
}
