use super::{failure, load_config, run_token, synthetic_items, SyntheticWork};
use crate::cli::PipelineArgs;
use crate::core::{PipelineProgress, PipelineResult, PipelineStage, ProcessingInput, RunError};
use crate::engine::{FnStage, Pipeline, WorkerPool, WorkerPoolStage};
use crate::services::config::EngineConfig;
use crate::services::{progress_callback, ConsoleProgressReporter};
use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// ワーカープール処理を担う先頭ステージの名前
const ITEMS_STAGE: &str = "items";

/// 合成ステージをパイプラインで実行し、結果をJSONで出力
pub async fn execute_pipeline(args: PipelineArgs, quiet: bool) -> Result<()> {
    let mut config = load_config(&args.run)?;
    config.pipeline.stop_on_error = !args.continue_on_error;
    if let Some(retries) = args.retries {
        config.pipeline.max_stage_retries = retries;
    }
    if let Some(retry_delay_ms) = args.retry_delay_ms {
        config.pipeline.retry_delay = Duration::from_millis(retry_delay_ms);
    }

    let pipeline = build(&args, &config)?;
    let reporter = Arc::new(if quiet {
        ConsoleProgressReporter::quiet()
    } else {
        ConsoleProgressReporter::new()
    });
    let callback = progress_callback(reporter);
    pipeline.set_progress_callback(move |progress| callback(progress));
    info!(stages = ?pipeline.stage_names(), "starting pipeline run");

    let input = ProcessingInput::new("cli").with_items(synthetic_items(args.items));
    let token = run_token(&args.run);
    let outcome = pipeline.execute(&token, &input).await;
    let progress = pipeline.progress();

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&summary(&result, &progress, false))?);
            Ok(())
        }
        Err(RunError::Interrupted { partial, error }) => {
            println!("{}", serde_json::to_string_pretty(&summary(&partial, &progress, true))?);
            Err(failure(error))
        }
        Err(RunError::Rejected(error)) => Err(failure(error)),
    }
}

/// 引数からパイプラインを組み立てる
fn build(args: &PipelineArgs, config: &EngineConfig) -> Result<Pipeline<u64>> {
    let pipeline = Pipeline::with_config(config.pipeline.clone());

    if args.items > 0 {
        let work = SyntheticWork {
            delay: Duration::from_millis(args.stage_delay_ms / 10),
            fail_every: 0,
        };
        let pool = Arc::new(WorkerPool::with_config(work, &config.worker_pool));
        pipeline.add_stage(
            WorkerPoolStage::new(ITEMS_STAGE, pool).with_description("入力アイテムの並列処理"),
        )?;
    }

    for name in &args.stages {
        pipeline.add_shared_stage(synthetic_stage(name, args))?;
    }
    Ok(pipeline)
}

fn synthetic_stage(name: &str, args: &PipelineArgs) -> Arc<dyn PipelineStage<u64>> {
    let delay = Duration::from_millis(args.stage_delay_ms);
    let fails = args.fail_stage.as_deref() == Some(name);
    let skip = args.skip_stage.iter().any(|skipped| skipped == name);
    let stage_name = name.to_string();

    let stage = FnStage::<u64>::new(name, move |token| {
        let stage_name = stage_name.clone();
        async move {
            anyhow::ensure!(token.sleep(delay).await, "キャンセルされました");
            anyhow::ensure!(!fails, "ステージ{stage_name}の合成エラー");
            Ok(json!({ "stage": stage_name, "delay_ms": delay.as_millis() as u64 }))
        }
    })
    .with_description(format!("合成ステージ {name}"))
    .with_estimated_duration(delay)
    .skip_when(move |_input| skip);

    Arc::new(stage)
}

fn summary(result: &PipelineResult, progress: &PipelineProgress, cancelled: bool) -> Value {
    json!({
        "cancelled": cancelled,
        "success": result.result.success,
        "failed_stage": result.failed_stage,
        "skipped_stages": result.skipped_stages,
        "errors": result.result.errors,
        "statistics": result.result.statistics,
        "outputs": result.result.outputs,
        "stage_results": result.stage_results,
        "duration_ms": result.pipeline_duration.as_millis() as u64,
        "progress": progress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunArgs;

    fn args(stages: &[&str]) -> PipelineArgs {
        PipelineArgs {
            run: RunArgs::default(),
            stages: stages.iter().map(|s| s.to_string()).collect(),
            stage_delay_ms: 1,
            fail_stage: None,
            skip_stage: Vec::new(),
            continue_on_error: false,
            retries: Some(0),
            retry_delay_ms: Some(1),
            items: 0,
        }
    }

    #[tokio::test]
    async fn test_build_with_items_stage() {
        let mut args = args(&["a", "b"]);
        args.items = 4;
        let pipeline = build(&args, &EngineConfig::default()).unwrap();

        assert_eq!(pipeline.stage_names(), vec![ITEMS_STAGE, "a", "b"]);
    }

    #[test]
    fn test_build_rejects_duplicate_stage_names() {
        assert!(build(&args(&["a", "a"]), &EngineConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_failing_and_skipped_stages() {
        let mut args = args(&["a", "b", "c"]);
        args.fail_stage = Some("c".to_string());
        args.skip_stage = vec!["b".to_string()];
        let mut config = EngineConfig::default();
        config.pipeline.max_stage_retries = 0;

        let pipeline = build(&args, &config).unwrap();
        let result = pipeline
            .execute(&crate::core::CancellationToken::new(), &ProcessingInput::new("t"))
            .await
            .unwrap();

        assert_eq!(result.skipped_stages, vec!["b".to_string()]);
        assert_eq!(result.failed_stage.as_deref(), Some("c"));
        assert_eq!(result.result.outputs["a"]["stage"], json!("a"));

        let value = summary(&result, &pipeline.progress(), false);
        assert_eq!(value["success"], json!(false));
    }

    #[tokio::test]
    async fn test_execute_pipeline_end_to_end() {
        let mut args = args(&["load", "store"]);
        args.items = 3;
        execute_pipeline(args, true).await.unwrap();
    }
}
