// Producer - タスク投入機能

use super::status::StatusTracker;
use crate::core::{CancellationToken, ProcessingItem};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// ワーカーへ渡す1件分のタスク
pub(crate) struct WorkTask<D> {
    pub(crate) item: Arc<ProcessingItem<D>>,
    /// 実行トークンから派生したタスク単位のトークン
    pub(crate) token: CancellationToken,
}

/// Producer: アイテムをタスクキューへ投入し、投入できた件数を返す
///
/// 投入中にキャンセルされた場合は早期に停止するため、
/// 投入件数がアイテム数より少なくなることがある。
pub(crate) fn spawn_producer<D>(
    items: Vec<ProcessingItem<D>>,
    task_tx: mpsc::Sender<WorkTask<D>>,
    token: CancellationToken,
    status: Arc<StatusTracker>,
) -> JoinHandle<usize>
where
    D: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut queued = 0;

        for item in items {
            if token.is_cancelled() {
                break;
            }

            let task = WorkTask {
                item: Arc::new(item),
                token: token.child_token(),
            };

            // ワーカーが先に取り出してもゲージが負にならないよう送信前に加算
            status.item_queued();
            let sent = tokio::select! {
                biased;
                _ = token.cancelled() => false,
                result = task_tx.send(task) => result.is_ok(),
            };

            if !sent {
                status.item_dequeued();
                break;
            }
            queued += 1;
        }

        // task_txをドロップしてキュー終了を通知
        queued
    })
}
