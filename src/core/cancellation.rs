// 協調的キャンセルのためのトークン
// 親トークンのキャンセルは子へ伝播するが、子から親へは伝播しない

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<TokenState>>>,
}

impl TokenState {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// 呼び出し元が早期終了を要求するためのハンドル
///
/// クローンは同じキャンセル状態を共有する。`child_token`で派生させたトークンは
/// 親のキャンセルに追従しつつ、単独でキャンセルすることもできる。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 親に連動する子トークンを作成
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        let mut children = self.state.children.lock();

        // cancel()はフラグを立ててから子リストを取り出すため、ロック下で確認する
        if self.is_cancelled() {
            drop(children);
            child.cancel();
            return child;
        }

        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(&child.state));
        child
    }

    /// キャンセルを要求（冪等）
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// キャンセルされるまで待機
    pub async fn cancelled(&self) {
        // Notifiedは作成時点からnotify_waitersを受け取れる
        let notified = self.state.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// キャンセル可能なスリープ
    ///
    /// 指定時間が経過すれば`true`、途中でキャンセルされれば`false`を返す。
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
        }
    }

    /// 指定時間後にキャンセルする期限を設定
    pub fn cancel_after(&self, delay: Duration) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => token.cancel(),
            }
        })
    }
}

/// スコープ終了時にトークンをキャンセルするガード
pub(crate) struct CancelOnDrop(pub(crate) CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
