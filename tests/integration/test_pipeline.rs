// パイプラインの統合テスト

use crate::fixtures::{echo_processor, string_items};
use serde_json::Value;
use stagepool::core::{MockPipelineStage, MockProgressReporter};
use stagepool::services::progress_callback;
use stagepool::{
    CancellationToken, FnStage, Pipeline, PipelineConfig, ProcessingInput, StageState,
    WorkerPool, WorkerPoolStage,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn sleeping_stage(name: &str, millis: u64) -> FnStage<String> {
    FnStage::new(name, move |token| async move {
        anyhow::ensure!(token.sleep(Duration::from_millis(millis)).await, "キャンセルされました");
        Ok(Value::Null)
    })
    .with_estimated_duration(Duration::from_millis(millis))
}

#[tokio::test]
async fn test_two_stages_without_failures() {
    let pipeline = Pipeline::new();
    pipeline.add_stage(sleeping_stage("stage1", 100)).unwrap();
    pipeline.add_stage(sleeping_stage("stage2", 50)).unwrap();

    let result = pipeline
        .execute(&CancellationToken::new(), &ProcessingInput::new("e2e"))
        .await
        .unwrap();

    assert!(result.result.errors.is_empty());
    assert_eq!(pipeline.progress().overall_progress, 1.0);
    assert_eq!(pipeline.progress().completed_stages, 2);
    assert_eq!(result.result.statistic("total_stages"), 2);
}

#[tokio::test]
async fn test_progress_is_observable_while_running() {
    let pipeline = Arc::new(Pipeline::new());
    pipeline.add_stage(sleeping_stage("slow", 200)).unwrap();
    pipeline.add_stage(sleeping_stage("fast", 10)).unwrap();

    let runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .execute(&CancellationToken::new(), &ProcessingInput::new("live"))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let progress = pipeline.progress();
    assert_eq!(progress.current_stage.as_deref(), Some("slow"));
    assert_eq!(progress.completed_stages, 0);
    assert_eq!(progress.total_stages, 2);
    assert!(progress.remaining_time > Duration::ZERO);

    runner.await.unwrap().unwrap();
    assert_eq!(pipeline.progress().overall_progress, 1.0);
}

#[tokio::test]
async fn test_retry_duration_includes_delays() {
    let pipeline = Pipeline::with_config(
        PipelineConfig::default()
            .with_max_stage_retries(3)
            .with_retry_delay(Duration::from_millis(25)),
    );
    let calls = Arc::new(AtomicU32::new(0));
    let stage_calls = calls.clone();
    pipeline
        .add_stage(FnStage::new("flaky", move |_token| {
            let attempt = stage_calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                anyhow::ensure!(attempt > 2, "一時的な失敗 ({attempt}回目)");
                Ok(Value::Null)
            }
        }))
        .unwrap();

    let result = pipeline
        .execute(&CancellationToken::new(), &ProcessingInput::<String>::new("retry"))
        .await
        .unwrap();
    let record = result.stage("flaky").unwrap();

    assert!(record.success);
    assert_eq!(record.attempts, 3);
    assert!(record.duration >= Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_mock_stages_with_skip_and_stop_on_error() {
    let pipeline = Pipeline::with_config(PipelineConfig::default().with_max_stage_retries(0));

    let mut skipped = MockPipelineStage::<String>::new();
    skipped.expect_name().return_const("cache".to_string());
    skipped.expect_estimated_duration().return_const(Duration::ZERO);
    skipped.expect_can_skip().returning(|input| input.option("cache") == Some("hit"));
    skipped.expect_execute().never();

    let mut failing = MockPipelineStage::<String>::new();
    failing.expect_name().return_const("validate".to_string());
    failing.expect_estimated_duration().return_const(Duration::from_millis(1));
    failing.expect_can_skip().returning(|_| false);
    failing
        .expect_execute()
        .times(1)
        .returning(|_, _, _| Err(anyhow::anyhow!("検証に失敗しました")));

    let mut never_reached = MockPipelineStage::<String>::new();
    never_reached.expect_name().return_const("publish".to_string());
    never_reached.expect_estimated_duration().return_const(Duration::ZERO);
    never_reached.expect_can_skip().never();
    never_reached.expect_execute().never();

    pipeline.add_stage(skipped).unwrap();
    pipeline.add_stage(failing).unwrap();
    pipeline.add_stage(never_reached).unwrap();

    let input = ProcessingInput::new("mocked").with_option("cache", "hit");
    let result = pipeline
        .execute(&CancellationToken::new(), &input)
        .await
        .unwrap();

    assert_eq!(result.skipped_stages, vec!["cache".to_string()]);
    assert_eq!(result.failed_stage.as_deref(), Some("validate"));
    assert_eq!(result.stage("validate").unwrap().state, StageState::Failed);
    assert!(result.stage("publish").is_none());
    assert_eq!(result.result.errors, vec!["validate: 検証に失敗しました".to_string()]);
    assert!(!result.result.success);
}

#[tokio::test]
async fn test_worker_pool_stage_inside_pipeline() {
    let pool = Arc::new(WorkerPool::new(echo_processor(Duration::from_millis(1)), 4));
    let pipeline = Pipeline::new();
    pipeline
        .add_stage(WorkerPoolStage::new("echo", Arc::clone(&pool)))
        .unwrap();
    pipeline.add_stage(sleeping_stage("finish", 1)).unwrap();

    let input = ProcessingInput::new("items").with_items(string_items(12));
    let result = pipeline
        .execute(&CancellationToken::new(), &input)
        .await
        .unwrap();

    assert!(result.result.success);
    assert_eq!(result.result.items_processed, 12);
    assert_eq!(result.result.statistic("successful_items"), 12);
    assert_eq!(result.result.outputs["echo"]["total_items"], 12);
    assert_eq!(pool.status().processed_items, 12);

    // アイテムが無い入力ではプールステージは省略される
    let empty = pipeline
        .execute(&CancellationToken::new(), &ProcessingInput::new("empty"))
        .await
        .unwrap();
    assert_eq!(empty.skipped_stages, vec!["echo".to_string()]);
}

#[tokio::test]
async fn test_cancellation_returns_partial_result() {
    let pipeline = Pipeline::new();
    pipeline.add_stage(sleeping_stage("first", 1)).unwrap();
    pipeline.add_stage(sleeping_stage("blocking", 10_000)).unwrap();
    pipeline.add_stage(sleeping_stage("last", 1)).unwrap();

    let token = CancellationToken::new();
    token.cancel_after(Duration::from_millis(50));
    let error = pipeline
        .execute(&token, &ProcessingInput::new("cancel"))
        .await
        .unwrap_err();

    assert!(error.is_cancelled());
    let partial = error.partial().unwrap();
    assert!(partial.stage("first").unwrap().success);
    assert!(partial.stage("last").is_none());
    assert!(!partial.result.success);
    assert!(pipeline.progress().overall_progress < 1.0);
}

#[tokio::test]
async fn test_reporter_receives_final_progress() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut reporter = MockProgressReporter::new();
    reporter.expect_report_pipeline().returning(move |progress| {
        let _ = tx.send(progress.overall_progress);
    });

    let pipeline = Pipeline::new();
    pipeline.add_stage(sleeping_stage("only", 1)).unwrap();
    let callback = progress_callback(Arc::new(reporter));
    pipeline.set_progress_callback(move |progress| callback(progress));

    pipeline
        .execute(&CancellationToken::new(), &ProcessingInput::new("report"))
        .await
        .unwrap();

    let mut saw_complete = false;
    while let Ok(Some(value)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        saw_complete |= value == 1.0;
    }
    assert!(saw_complete);
}
