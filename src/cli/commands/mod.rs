// CLIコマンド実装と共通処理

pub mod pipeline;
pub mod pool;

pub use pipeline::execute_pipeline;
pub use pool::execute_pool;

use crate::cli::RunArgs;
use crate::core::{CancellationToken, ErrorSeverity, ItemProcessor, ProcessingError, ProcessingItem};
use crate::services::config::EngineConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// 設定ファイルを読み込む（未指定時はデフォルト設定）
pub(crate) fn load_config(run: &RunArgs) -> Result<EngineConfig> {
    match &run.config {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            Ok(EngineConfig::from_file(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// 実行用トークンを作成し、タイムアウトが指定されていれば期限を設定
pub(crate) fn run_token(run: &RunArgs) -> CancellationToken {
    let token = CancellationToken::new();
    if let Some(timeout_ms) = run.timeout_ms {
        token.cancel_after(Duration::from_millis(timeout_ms));
    }
    token
}

/// 実行エラーを重要度に応じたレベルでログに残し、終了用のエラーへ変換
pub(crate) fn failure(err: ProcessingError) -> anyhow::Error {
    let severity = err.severity();
    if severity >= ErrorSeverity::High {
        error!(code = %err.code, severity = severity.as_str(), operation = %err.operation, "{}", err.message);
    } else {
        warn!(code = %err.code, severity = severity.as_str(), operation = %err.operation, "{}", err.message);
    }
    err.into()
}

/// 合成ワークロード: 一定時間待機し、N件ごとに失敗する
#[derive(Debug, Clone, Copy)]
pub(crate) struct SyntheticWork {
    pub(crate) delay: Duration,
    pub(crate) fail_every: u64,
}

#[async_trait]
impl ItemProcessor<u64, Value> for SyntheticWork {
    async fn process(&self, token: CancellationToken, item: Arc<ProcessingItem<u64>>) -> Result<Value> {
        anyhow::ensure!(token.sleep(self.delay).await, "処理中にキャンセルされました: {}", item.id);
        if self.fail_every > 0 && (item.data + 1) % self.fail_every == 0 {
            anyhow::bail!("合成エラー: {}番目のアイテム", item.data + 1);
        }
        Ok(json!({ "processed": item.id, "data": item.data }))
    }
}

pub(crate) fn synthetic_items(count: u64) -> Vec<ProcessingItem<u64>> {
    (0..count)
        .map(|i| ProcessingItem::new(format!("item-{i:04}"), i))
        .collect()
}
