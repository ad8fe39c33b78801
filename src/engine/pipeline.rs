// Pipeline - ステージ逐次実行オーケストレーション
// リトライ・スキップ・キャンセルの方針を適用し、ステージごとの結果と進捗を集計する

use super::progress::{dispatch, LatestProgress};
use crate::core::{
    CancellationToken, EngineResult, PipelineProgress, PipelineResult, PipelineStage,
    ProcessingError, ProcessingInput, ProcessingResult, ProgressCallback, RunError, StageResult,
    StageState,
};
use crate::services::config::PipelineConfig;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub(crate) const STAGE_CANCELLED_MESSAGE: &str = "ステージ実行中にキャンセルされました";
pub(crate) const STAGE_PANICKED_MESSAGE: &str = "ステージがパニックしました";

/// 名前付きステージを追加順に実行するパイプライン
///
/// ステージ一覧と設定は読み書きロックで保護されるため、`&self`から変更できる。
/// 設定の変更は次回の`execute`から反映される。
pub struct Pipeline<D> {
    stages: RwLock<Vec<Arc<dyn PipelineStage<D>>>>,
    settings: RwLock<PipelineConfig>,
    callback: RwLock<Option<ProgressCallback>>,
    progress: LatestProgress,
}

impl<D> Default for Pipeline<D>
where
    D: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Pipeline<D>
where
    D: Send + Sync + 'static,
{
    /// デフォルト設定でパイプラインを作成
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            stages: RwLock::new(Vec::new()),
            settings: RwLock::new(config),
            callback: RwLock::new(None),
            progress: LatestProgress::new(),
        }
    }

    /// ステージを末尾に追加
    pub fn add_stage<S>(&self, stage: S) -> EngineResult<()>
    where
        S: PipelineStage<D> + 'static,
    {
        self.add_shared_stage(Arc::new(stage))
    }

    /// 共有済みのステージを末尾に追加
    ///
    /// ステージ名は結果マップのキーになるため、空の名前と重複は拒否する。
    pub fn add_shared_stage(&self, stage: Arc<dyn PipelineStage<D>>) -> EngineResult<()> {
        let name = stage.name().to_string();
        if name.trim().is_empty() {
            return Err(ProcessingError::validation("stage.name", "ステージ名が空です"));
        }

        let mut stages = self.stages.write();
        if stages.iter().any(|existing| existing.name() == name) {
            return Err(ProcessingError::validation(
                "stage.name",
                format!("ステージ名が重複しています: {name}"),
            ));
        }
        debug!(stage = %name, position = stages.len(), "stage added");
        stages.push(stage);
        Ok(())
    }

    /// 登録済みステージ（追加順）
    pub fn stages(&self) -> Vec<Arc<dyn PipelineStage<D>>> {
        self.stages.read().clone()
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .read()
            .iter()
            .map(|stage| stage.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.read().is_empty()
    }

    pub fn config(&self) -> PipelineConfig {
        self.settings.read().clone()
    }

    pub fn set_stop_on_error(&self, stop_on_error: bool) {
        self.settings.write().stop_on_error = stop_on_error;
    }

    pub fn set_max_stage_retries(&self, max_stage_retries: u32) {
        self.settings.write().max_stage_retries = max_stage_retries;
    }

    pub fn set_retry_delay(&self, retry_delay: Duration) {
        let mut settings = self.settings.write();
        *settings = settings.clone().with_retry_delay(retry_delay);
    }

    /// 進捗更新ごとに呼び出されるコールバックを設定
    ///
    /// コールバックは別タスクで呼び出されるため、呼び出し順や
    /// `execute`完了前の到達は保証されない。
    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(PipelineProgress) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    pub fn clear_progress_callback(&self) {
        *self.callback.write() = None;
    }

    /// 直近の実行の進捗スナップショット
    ///
    /// 実行が重なった場合は、最後に開始した実行の進捗を返す。
    pub fn progress(&self) -> PipelineProgress {
        self.progress.snapshot()
    }

    /// 全ステージを追加順に実行
    ///
    /// ステージの失敗は`PipelineResult`に記録され、エラーとしては返らない。
    /// `Err`になるのはキャンセルされた場合のみで、途中までの結果を保持する。
    pub async fn execute(
        &self,
        token: &CancellationToken,
        input: &ProcessingInput<D>,
    ) -> Result<PipelineResult, RunError<PipelineResult>> {
        // ロックを保持したままawaitしないよう、実行前に複製する
        let stages = self.stages();
        let config = self.config();
        let callback = self.callback.read().clone();
        let notify = |progress: PipelineProgress| dispatch(callback.as_ref(), progress);

        let started = Instant::now();
        let mut pipeline = PipelineResult::default();
        pipeline.result.started_at = Some(Utc::now());

        let (run, initial) = self
            .progress
            .begin(stages.iter().map(|stage| stage.estimated_duration()).collect());
        notify(initial);
        info!(input = %input.id, stages = stages.len(), "pipeline started");

        let mut cancelled = false;
        for stage in &stages {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            let name = stage.name().to_string();
            if stage.can_skip(input) {
                debug!(stage = %name, "stage skipped");
                pipeline.skipped_stages.push(name.clone());
                pipeline.stage_results.insert(name.clone(), StageResult::skipped(name));
                notify(run.stage_completed());
                continue;
            }

            notify(run.stage_started(&name));
            let record = run_stage(stage.as_ref(), &config, token, input, &mut pipeline.result).await;
            let state = record.state;

            if !record.success {
                if let Some(error) = &record.error {
                    pipeline.result.add_error(format!("{name}: {error}"));
                }
                pipeline.failed_stage.get_or_insert_with(|| name.clone());
            }
            pipeline.stage_results.insert(name.clone(), record);

            if state == StageState::Cancelled {
                cancelled = true;
                break;
            }
            notify(run.stage_completed());

            if state == StageState::Failed && config.stop_on_error {
                warn!(stage = %name, "stage failed, stopping pipeline");
                break;
            }
        }

        finalize(&mut pipeline, stages.len(), started.elapsed(), cancelled);
        notify(run.finish());

        if cancelled {
            warn!(
                input = %input.id,
                completed = pipeline.result.statistic("completed_stages"),
                "pipeline cancelled"
            );
            return Err(RunError::interrupted(
                pipeline,
                ProcessingError::cancelled("pipeline.execute"),
            ));
        }

        info!(
            input = %input.id,
            success = pipeline.result.success,
            failed_stage = pipeline.failed_stage.as_deref().unwrap_or(""),
            elapsed_ms = pipeline.pipeline_duration.as_millis() as u64,
            "pipeline completed"
        );
        Ok(pipeline)
    }
}

/// ステージ1件をリトライ方針に従って実行
///
/// ステージのパニックは失敗した試行として扱い、パイプラインの外へ伝播させない。
async fn run_stage<D>(
    stage: &dyn PipelineStage<D>,
    config: &PipelineConfig,
    token: &CancellationToken,
    input: &ProcessingInput<D>,
    output: &mut ProcessingResult,
) -> StageResult
where
    D: Send + Sync + 'static,
{
    let name = stage.name();
    let started_at = Utc::now();
    let started = Instant::now();
    let max_attempts = config.max_attempts();
    let mut attempts = 0;

    let (state, error) = loop {
        if token.is_cancelled() {
            break (StageState::Cancelled, Some(STAGE_CANCELLED_MESSAGE.to_string()));
        }

        attempts += 1;
        debug!(stage = name, attempt = attempts, max_attempts, "executing stage");
        let outcome = AssertUnwindSafe(stage.execute(token, input, output))
            .catch_unwind()
            .await;
        let error = match outcome {
            Ok(Ok(())) => break (StageState::Succeeded, None),
            Ok(Err(error)) => format!("{error:#}"),
            Err(_) => STAGE_PANICKED_MESSAGE.to_string(),
        };

        if token.is_cancelled() {
            break (StageState::Cancelled, Some(STAGE_CANCELLED_MESSAGE.to_string()));
        }
        if attempts >= max_attempts {
            warn!(stage = name, attempts, error = %error, "stage failed");
            break (StageState::Failed, Some(error));
        }

        warn!(stage = name, attempt = attempts, error = %error, "stage attempt failed, retrying");
        debug!(
            stage = name,
            state = ?StageState::Retrying,
            delay_ms = config.retry_delay().as_millis() as u64,
            "waiting before retry"
        );
        if !token.sleep(config.retry_delay()).await {
            break (StageState::Cancelled, Some(STAGE_CANCELLED_MESSAGE.to_string()));
        }
    };

    StageResult {
        name: name.to_string(),
        state,
        success: state == StageState::Succeeded,
        skipped: false,
        error,
        attempts,
        duration: started.elapsed(),
        started_at,
        completed_at: Utc::now(),
    }
}

/// 集計値を`ProcessingResult`へ書き込む
fn finalize(pipeline: &mut PipelineResult, total_stages: usize, elapsed: Duration, cancelled: bool) {
    let count = |state: StageState| {
        pipeline
            .stage_results
            .values()
            .filter(|record| record.state == state)
            .count() as u64
    };
    let successful = count(StageState::Succeeded);
    let failed = count(StageState::Failed);
    let skipped = pipeline.skipped_stages.len() as u64;

    let result = &mut pipeline.result;
    result.statistics.extend([
        ("total_stages".to_string(), total_stages as u64),
        ("completed_stages".to_string(), successful + failed + skipped),
        ("successful_stages".to_string(), successful),
        ("failed_stages".to_string(), failed),
        ("skipped_stages".to_string(), skipped),
    ]);
    result.success = failed == 0 && !cancelled;
    result.duration = elapsed;
    result.completed_at = Some(Utc::now());
    pipeline.pipeline_duration = elapsed;
}
