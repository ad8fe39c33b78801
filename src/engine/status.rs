// StatusTracker - ワーカープールの実行状態管理
// 構造的フィールドはRwLock、ホットパスのカウンタはAtomicで保護する（同一フィールドを両方で守らない）

use crate::core::types::{estimate_remaining, ratio, ConcurrentStatus, ProcessingState};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
struct RunInfo {
    state: ProcessingState,
    total_items: usize,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

/// 実行中のワーカープールの状態
#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    run: RwLock<RunInfo>,
    processed: AtomicUsize,
    successful: AtomicUsize,
    failed: AtomicUsize,
    active_workers: AtomicUsize,
    queued: AtomicUsize,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 新しい実行を開始（カウンタをリセット）
    pub(crate) fn begin(&self, total_items: usize) {
        let mut run = self.run.write();
        self.processed.store(0, Ordering::Release);
        self.successful.store(0, Ordering::Release);
        self.failed.store(0, Ordering::Release);
        self.active_workers.store(0, Ordering::Release);
        self.queued.store(0, Ordering::Release);

        *run = RunInfo {
            state: ProcessingState::Running,
            total_items,
            started_at: Some(Instant::now()),
            finished_at: None,
        };
    }

    pub(crate) fn finish(&self, state: ProcessingState) {
        let mut run = self.run.write();
        run.state = state;
        run.finished_at = Some(Instant::now());
    }

    /// 結果1件を集計
    pub(crate) fn record(&self, success: bool) {
        if success {
            self.successful.fetch_add(1, Ordering::AcqRel);
        } else {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
        self.processed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn item_queued(&self) {
        self.queued.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn item_dequeued(&self) {
        // 減算はenqueue済みの分だけ行われるが、resetとの競合でも0未満にしない
        let _ = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn worker_busy(&self) {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn worker_idle(&self) {
        let _ = self
            .active_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// 現時点のスナップショットを取得
    pub(crate) fn snapshot(&self) -> ConcurrentStatus {
        let run = self.run.read();
        let processed_items = self.processed.load(Ordering::Acquire);
        let progress = ratio(processed_items, run.total_items);
        let elapsed_time = match (run.started_at, run.finished_at) {
            (Some(started), Some(finished)) => finished.duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Default::default(),
        };

        ConcurrentStatus {
            state: run.state,
            total_items: run.total_items,
            processed_items,
            successful_items: self.successful.load(Ordering::Acquire),
            failed_items: self.failed.load(Ordering::Acquire),
            active_workers: self.active_workers.load(Ordering::Acquire),
            queued_items: self.queued.load(Ordering::Acquire),
            progress,
            elapsed_time,
            estimated_time: estimate_remaining(elapsed_time, progress),
        }
    }
}

/// 直近の実行の状態を公開する
///
/// 実行ごとに新しい`StatusTracker`を作って差し替えるため、重なった実行や
/// 破棄された実行の残りタスクが別の実行のカウンタを書き換えることはない。
#[derive(Debug, Default)]
pub(crate) struct LatestStatus {
    current: RwLock<Arc<StatusTracker>>,
}

impl LatestStatus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 新しい実行を開始して公開する
    pub(crate) fn begin(&self, total_items: usize) -> RunGuard {
        let tracker = Arc::new(StatusTracker::new());
        tracker.begin(total_items);
        *self.current.write() = Arc::clone(&tracker);
        RunGuard {
            tracker,
            finished: false,
        }
    }

    pub(crate) fn snapshot(&self) -> ConcurrentStatus {
        let tracker = Arc::clone(&*self.current.read());
        tracker.snapshot()
    }
}

/// 実行中の`StatusTracker`を保持するガード
///
/// `finish`されずにドロップされた場合（Futureの破棄や途中のエラー）は`Cancelled`で終了させる。
pub(crate) struct RunGuard {
    tracker: Arc<StatusTracker>,
    finished: bool,
}

impl RunGuard {
    pub(crate) fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub(crate) fn finish(mut self, state: ProcessingState) {
        self.tracker.finish(state);
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.finish(ProcessingState::Cancelled);
        }
    }
}
