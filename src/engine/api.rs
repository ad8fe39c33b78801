// 高レベル公開API
// WorkerPool / Pipelineを一度だけ実行する場合の便利な関数

use super::{Pipeline, WorkerPool};
use crate::core::{
    CancellationToken, ConcurrentResult, EngineResult, ItemProcessor, PipelineResult, PipelineStage,
    ProcessingInput, ProcessingItem, RunError,
};
use crate::services::config::EngineConfig;
use std::sync::Arc;

/// 設定からワーカープールを作成してアイテムを処理
pub async fn process_items<P, D, O>(
    processor: P,
    items: Vec<ProcessingItem<D>>,
    config: &EngineConfig,
    token: &CancellationToken,
) -> Result<ConcurrentResult<D, O>, RunError<ConcurrentResult<D, O>>>
where
    P: ItemProcessor<D, O> + 'static,
    D: Send + Sync + 'static,
    O: Send + 'static,
{
    WorkerPool::with_config(processor, &config.worker_pool)
        .process(token, items)
        .await
}

/// 設定からパイプラインを組み立てる
///
/// ステージ名が空または重複している場合は検証エラーとなる。
pub fn build_pipeline<D>(
    stages: Vec<Arc<dyn PipelineStage<D>>>,
    config: &EngineConfig,
) -> EngineResult<Pipeline<D>>
where
    D: Send + Sync + 'static,
{
    let pipeline = Pipeline::with_config(config.pipeline.clone());
    for stage in stages {
        pipeline.add_shared_stage(stage)?;
    }
    Ok(pipeline)
}

/// ステージ一覧を組み立てて一度だけ実行
pub async fn run_pipeline<D>(
    stages: Vec<Arc<dyn PipelineStage<D>>>,
    input: &ProcessingInput<D>,
    config: &EngineConfig,
    token: &CancellationToken,
) -> Result<PipelineResult, RunError<PipelineResult>>
where
    D: Send + Sync + 'static,
{
    build_pipeline(stages, config)?.execute(token, input).await
}
