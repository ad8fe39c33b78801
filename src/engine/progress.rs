// ProgressTracker - パイプラインの進捗管理とコールバック通知

use crate::core::types::{estimate_remaining, ratio};
use crate::core::{PipelineProgress, ProgressCallback};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ProgressState {
    progress: PipelineProgress,
    /// ステージごとの想定所要時間（実行順）
    estimates: Vec<Duration>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

/// パイプライン実行中の進捗
///
/// 更新はすべて書き込みロック下で行い、読み出し側にはコピーを返す。
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    state: RwLock<ProgressState>,
}

impl ProgressTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 新しい実行を開始（前回の進捗は破棄される）
    pub(crate) fn begin(&self, estimates: Vec<Duration>) -> PipelineProgress {
        let mut state = self.state.write();
        *state = ProgressState {
            progress: PipelineProgress {
                total_stages: estimates.len(),
                ..PipelineProgress::default()
            },
            estimates,
            started_at: Some(Instant::now()),
            finished_at: None,
        };
        Self::refresh(&mut state)
    }

    pub(crate) fn stage_started(&self, name: &str) -> PipelineProgress {
        let mut state = self.state.write();
        state.progress.current_stage = Some(name.to_string());
        Self::refresh(&mut state)
    }

    /// ステージの終了（成功・失敗・スキップ）を記録
    pub(crate) fn stage_completed(&self) -> PipelineProgress {
        let mut state = self.state.write();
        let total = state.progress.total_stages;
        state.progress.completed_stages = (state.progress.completed_stages + 1).min(total);
        state.progress.current_stage = None;
        Self::refresh(&mut state)
    }

    /// 実行を終了し、経過時間を確定する
    pub(crate) fn finish(&self) -> PipelineProgress {
        let mut state = self.state.write();
        state.progress.current_stage = None;
        state.finished_at = Some(Instant::now());
        Self::refresh(&mut state)
    }

    pub(crate) fn snapshot(&self) -> PipelineProgress {
        let state = self.state.read();
        let mut progress = state.progress.clone();
        if state.finished_at.is_none() {
            if let Some(started) = state.started_at {
                progress.elapsed_time = started.elapsed();
                progress.remaining_time = Self::remaining(&state, progress.elapsed_time);
            }
        }
        progress
    }

    fn refresh(state: &mut ProgressState) -> PipelineProgress {
        let elapsed = match (state.started_at, state.finished_at) {
            (Some(started), Some(finished)) => finished.duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        };

        let progress = &mut state.progress;
        progress.overall_progress = if progress.total_stages == 0 && state.finished_at.is_some() {
            1.0
        } else {
            ratio(progress.completed_stages, progress.total_stages)
        };
        progress.elapsed_time = elapsed;
        progress.last_update = Utc::now();

        let remaining = if state.finished_at.is_some() {
            Duration::ZERO
        } else {
            Self::remaining(state, elapsed)
        };
        state.progress.remaining_time = remaining;
        state.progress.clone()
    }

    /// 最初のステージ完了前は想定所要時間の合計、以降は線形外挿
    fn remaining(state: &ProgressState, elapsed: Duration) -> Duration {
        let progress = &state.progress;
        if progress.completed_stages == 0 {
            state.estimates.iter().sum()
        } else {
            estimate_remaining(elapsed, progress.overall_progress)
        }
    }
}

/// 直近の実行の進捗を公開する
///
/// 実行ごとに新しい`ProgressTracker`へ差し替えるため、同じパイプラインで
/// 重なった実行が互いの進捗を書き換えることはない。
#[derive(Debug, Default)]
pub(crate) struct LatestProgress {
    current: RwLock<Arc<ProgressTracker>>,
}

impl LatestProgress {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 新しい実行を開始して公開し、開始時点の進捗を返す
    pub(crate) fn begin(&self, estimates: Vec<Duration>) -> (ProgressRun, PipelineProgress) {
        let tracker = Arc::new(ProgressTracker::new());
        let progress = tracker.begin(estimates);
        *self.current.write() = Arc::clone(&tracker);
        (
            ProgressRun {
                tracker,
                finished: false,
            },
            progress,
        )
    }

    pub(crate) fn snapshot(&self) -> PipelineProgress {
        let tracker = Arc::clone(&*self.current.read());
        tracker.snapshot()
    }
}

/// 実行中の`ProgressTracker`を保持するガード
///
/// `finish`されずにドロップされた場合も経過時間を確定させる。
pub(crate) struct ProgressRun {
    tracker: Arc<ProgressTracker>,
    finished: bool,
}

impl ProgressRun {
    pub(crate) fn stage_started(&self, name: &str) -> PipelineProgress {
        self.tracker.stage_started(name)
    }

    pub(crate) fn stage_completed(&self) -> PipelineProgress {
        self.tracker.stage_completed()
    }

    pub(crate) fn finish(mut self) -> PipelineProgress {
        self.finished = true;
        self.tracker.finish()
    }
}

impl Drop for ProgressRun {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.finish();
        }
    }
}

/// 進捗をコールバックへ非同期に通知（順序・到達は保証しない）
pub(crate) fn dispatch(callback: Option<&ProgressCallback>, progress: PipelineProgress) {
    if let Some(callback) = callback {
        let callback = ProgressCallback::clone(callback);
        tokio::spawn(async move { callback(progress) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn millis(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_begin_uses_estimates_for_remaining_time() {
        let tracker = ProgressTracker::new();
        let progress = tracker.begin(millis(&[100, 50]));

        assert_eq!(progress.total_stages, 2);
        assert_eq!(progress.completed_stages, 0);
        assert_eq!(progress.overall_progress, 0.0);
        assert_eq!(progress.remaining_time, Duration::from_millis(150));
    }

    #[test]
    fn test_stage_transitions() {
        let tracker = ProgressTracker::new();
        tracker.begin(millis(&[10, 10]));

        let started = tracker.stage_started("load");
        assert_eq!(started.current_stage.as_deref(), Some("load"));

        let completed = tracker.stage_completed();
        assert_eq!(completed.completed_stages, 1);
        assert_eq!(completed.current_stage, None);
        assert!((completed.overall_progress - 0.5).abs() < 1e-9);

        tracker.stage_completed();
        let finished = tracker.finish();
        assert_eq!(finished.overall_progress, 1.0);
        assert_eq!(finished.remaining_time, Duration::ZERO);
    }

    #[test]
    fn test_completed_stages_never_exceed_total() {
        let tracker = ProgressTracker::new();
        tracker.begin(millis(&[1]));
        tracker.stage_completed();
        let progress = tracker.stage_completed();

        assert_eq!(progress.completed_stages, 1);
        assert_eq!(progress.overall_progress, 1.0);
    }

    #[test]
    fn test_empty_pipeline_finishes_at_full_progress() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.begin(Vec::new()).overall_progress, 0.0);
        assert_eq!(tracker.finish().overall_progress, 1.0);
    }

    #[test]
    fn test_snapshot_is_frozen_after_finish() {
        let tracker = ProgressTracker::new();
        tracker.begin(millis(&[1]));
        tracker.stage_completed();
        let finished = tracker.finish();

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(tracker.snapshot().elapsed_time, finished.elapsed_time);
    }

    #[tokio::test]
    async fn test_dispatch_invokes_callback() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let callback: ProgressCallback = Arc::new(move |progress: PipelineProgress| {
            let _ = tx.send(progress.completed_stages);
        });

        dispatch(Some(&callback), PipelineProgress::default());
        dispatch(None, PipelineProgress::default());

        assert_eq!(rx.recv().await, Some(0));
    }

    #[test]
    fn test_latest_progress_isolates_runs() {
        let latest = LatestProgress::new();
        let (first, _) = latest.begin(millis(&[1, 1, 1]));
        first.stage_completed();

        let (second, started) = latest.begin(millis(&[1]));
        assert_eq!(started.total_stages, 1);

        first.stage_completed();
        first.stage_completed();
        let progress = latest.snapshot();
        assert_eq!(progress.total_stages, 1);
        assert_eq!(progress.completed_stages, 0);

        second.stage_completed();
        assert_eq!(second.finish().overall_progress, 1.0);
        assert_eq!(first.finish().completed_stages, 3);
        assert_eq!(latest.snapshot().total_stages, 1);
    }

    #[test]
    fn test_dropped_progress_run_is_finished() {
        let latest = LatestProgress::new();
        {
            let (run, _) = latest.begin(millis(&[1, 1]));
            run.stage_started("load");
        }

        let progress = latest.snapshot();
        assert_eq!(progress.current_stage, None);
        assert_eq!(progress.remaining_time, Duration::ZERO);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(latest.snapshot().elapsed_time, progress.elapsed_time);
    }
}
