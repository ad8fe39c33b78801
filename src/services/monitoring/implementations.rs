// 進捗監視の具象実装

use crate::core::{
    CancellationToken, ConcurrentStatus, PipelineProgress, ProgressCallback, ProgressReporter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// 標準エラー出力による進捗報告実装
///
/// 標準出力は結果のJSON出力に使うため、進捗表示は標準エラー出力に書く。
#[derive(Debug, Default, Clone)]
pub struct ConsoleProgressReporter {
    quiet: bool,
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self { quiet: true }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_pipeline(&self, progress: &PipelineProgress) {
        if self.quiet {
            return;
        }
        let percentage = progress.overall_progress * 100.0;
        match &progress.current_stage {
            Some(stage) => eprintln!(
                "▶ [{}/{}] {stage} ({percentage:.1}%)",
                progress.completed_stages, progress.total_stages
            ),
            None => eprintln!(
                "📊 Stages: {}/{} ({percentage:.1}%), remaining ~{}ms",
                progress.completed_stages,
                progress.total_stages,
                progress.remaining_time.as_millis()
            ),
        }
    }

    fn report_pool(&self, status: &ConcurrentStatus) {
        if self.quiet {
            return;
        }
        let percentage = status.progress * 100.0;
        eprintln!(
            "📊 Items: {}/{} ({percentage:.1}%), ok {}, failed {}, active workers {}, queued {}",
            status.processed_items,
            status.total_items,
            status.successful_items,
            status.failed_items,
            status.active_workers,
            status.queued_items
        );
    }
}

/// tracingのイベントとして進捗を出力する実装
#[derive(Debug, Default, Clone)]
pub struct TracingProgressReporter;

impl TracingProgressReporter {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report_pipeline(&self, progress: &PipelineProgress) {
        info!(
            completed = progress.completed_stages,
            total = progress.total_stages,
            current = progress.current_stage.as_deref().unwrap_or("-"),
            progress = progress.overall_progress,
            remaining_ms = progress.remaining_time.as_millis() as u64,
            "pipeline progress"
        );
    }

    fn report_pool(&self, status: &ConcurrentStatus) {
        info!(
            processed = status.processed_items,
            total = status.total_items,
            failed = status.failed_items,
            active_workers = status.active_workers,
            queued = status.queued_items,
            "worker pool status"
        );
    }
}

/// 報告実装をパイプラインの進捗コールバックに変換
pub fn progress_callback<R>(reporter: Arc<R>) -> ProgressCallback
where
    R: ProgressReporter + 'static,
{
    Arc::new(move |progress: PipelineProgress| reporter.report_pipeline(&progress))
}

/// 一定間隔でワーカープールの状態を報告するタスクを起動
///
/// トークンがキャンセルされるまで`interval`ごとに`status`を呼び出す。
pub fn spawn_status_monitor<R, F>(
    reporter: Arc<R>,
    status: F,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()>
where
    R: ProgressReporter + 'static,
    F: Fn() -> ConcurrentStatus + Send + 'static,
{
    tokio::spawn(async move {
        while token.sleep(interval).await {
            reporter.report_pool(&status());
        }
    })
}
