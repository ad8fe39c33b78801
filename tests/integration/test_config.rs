// 設定ファイルからエンジンを構築する統合テスト

use crate::fixtures::{echo_processor, string_items};
use stagepool::engine::{process_items, run_pipeline};
use stagepool::{
    CancellationToken, EngineConfig, ErrorCode, FnStage, PipelineStage, ProcessingInput,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn config_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_worker_pool_from_config_file() {
    let file = config_file(r#"{"worker_pool": {"worker_count": 3, "batch_size": 4}}"#);
    let config = EngineConfig::from_file(file.path()).unwrap();

    let result = process_items(
        echo_processor(Duration::ZERO),
        string_items(9),
        &config,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(result.worker_count, 3);
    assert_eq!(result.statistics["batch_size"], 4);
    assert_eq!(result.successful_items, 9);
}

#[tokio::test]
async fn test_pipeline_policy_from_config_file() {
    let file = config_file(
        r#"{"pipeline": {"stop_on_error": false, "max_stage_retries": 1, "retry_delay_ms": 5}}"#,
    );
    let config = EngineConfig::from_file(file.path()).unwrap();

    let stages: Vec<Arc<dyn PipelineStage<String>>> = vec![
        Arc::new(FnStage::new("broken", |_token| async {
            Err::<serde_json::Value, _>(anyhow::anyhow!("常に失敗"))
        })),
        Arc::new(FnStage::new("after", |_token| async {
            Ok::<_, anyhow::Error>(serde_json::json!("done"))
        })),
    ];

    let result = run_pipeline(
        stages,
        &ProcessingInput::new("config"),
        &config,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(result.stage("broken").unwrap().attempts, 2);
    assert!(result.stage("after").unwrap().success);
    assert_eq!(result.failed_stage.as_deref(), Some("broken"));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let file = config_file(r#"{"worker_pool": {"worker_count": 0}}"#);
    let error = EngineConfig::from_file(file.path()).unwrap_err();
    assert_eq!(error.code, ErrorCode::Configuration);

    let broken = config_file("{ not json");
    assert!(EngineConfig::from_file(broken.path()).is_err());

    let missing = EngineConfig::from_file("/nonexistent/stagepool.json").unwrap_err();
    assert_eq!(missing.code, ErrorCode::Configuration);
}
